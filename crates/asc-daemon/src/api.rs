// SPDX-License-Identifier: MIT OR Apache-2.0
//! Route table, request/response envelopes and handlers.

use crate::middleware::require_api_key;
use crate::{ApiError, AppState};
use asc_core::{
    Campaign, ExportFormat, ItemStatus, Persona, ProviderSpec, Run, RunSpec, RunStatus,
    RunStatusCounts, Topic, new_id,
};
use asc_runtime::{ImportItem, ImportOutcome, import_questions};
use asc_store::Store;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

/// Assemble the full application router over the shared state.
pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/campaigns", post(create_campaign).get(list_campaigns))
        .route("/api/v1/campaigns/{campaign_id}", get(get_campaign))
        .route("/api/v1/topics", post(create_topic))
        .route("/api/v1/topics/{topic_id}", get(get_topic))
        .route("/api/v1/personas", post(create_persona))
        .route("/api/v1/personas/{persona_id}", get(get_persona))
        .route("/api/v1/ingest/questions", post(import_batch))
        .route("/api/v1/runs", post(create_run))
        .route("/api/v1/runs/{run_id}", get(get_run))
        .route("/api/v1/runs/{run_id}/start", post(start_run))
        .route("/api/v1/runs/{run_id}/resume", post(resume_run))
        .route("/api/v1/runs/{run_id}/items", get(get_run_items))
        .route("/api/v1/runs/{run_id}/results:download", get(download_results))
        .route("/api/v1/exports", post(create_export))
        .route("/api/v1/exports/{export_id}", get(get_export))
        .route("/api/v1/deliveries/{delivery_id}", get(get_delivery))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": state.providers.enabled_providers(),
    }))
}

// ---------------------------------------------------------------------------
// Campaigns / topics / personas
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateCampaignRequest {
    name: String,
    #[serde(default)]
    product_name: Option<String>,
}

async fn create_campaign(
    State(state): State<AppState>,
    Json(request): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::bad_request("campaign name must not be empty"));
    }
    let campaign = Campaign {
        id: new_id(),
        name: request.name,
        product_name: request.product_name,
        created_at: Utc::now(),
    };
    state.store.create_campaign(campaign.clone()).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn list_campaigns(
    State(state): State<AppState>,
) -> Result<Json<Vec<Campaign>>, ApiError> {
    Ok(Json(state.store.list_campaigns().await?))
}

async fn get_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
    Ok(Json(state.store.get_campaign(&campaign_id).await?))
}

#[derive(Debug, Deserialize)]
struct CreateTopicRequest {
    campaign_id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
}

async fn create_topic(
    State(state): State<AppState>,
    Json(request): Json<CreateTopicRequest>,
) -> Result<(StatusCode, Json<Topic>), ApiError> {
    let topic = Topic {
        id: new_id(),
        campaign_id: request.campaign_id,
        title: request.title,
        description: request.description,
        created_at: Utc::now(),
    };
    state.store.create_topic(topic.clone()).await?;
    Ok((StatusCode::CREATED, Json(topic)))
}

async fn get_topic(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
) -> Result<Json<Topic>, ApiError> {
    Ok(Json(state.store.get_topic(&topic_id).await?))
}

#[derive(Debug, Deserialize)]
struct CreatePersonaRequest {
    name: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    locale: Option<String>,
    #[serde(default)]
    tone: Option<String>,
    #[serde(default)]
    extras: Value,
}

async fn create_persona(
    State(state): State<AppState>,
    Json(request): Json<CreatePersonaRequest>,
) -> Result<(StatusCode, Json<Persona>), ApiError> {
    let persona = Persona {
        id: new_id(),
        name: request.name,
        role: request.role,
        domain: request.domain,
        locale: request.locale,
        tone: request.tone,
        extras: request.extras,
        created_at: Utc::now(),
    };
    state.store.create_persona(persona.clone()).await?;
    Ok((StatusCode::CREATED, Json(persona)))
}

async fn get_persona(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
) -> Result<Json<Persona>, ApiError> {
    Ok(Json(state.store.get_persona(&persona_id).await?))
}

// ---------------------------------------------------------------------------
// Question import
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ImportRequest {
    items: Vec<ImportItem>,
}

async fn import_batch(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportOutcome>, ApiError> {
    let outcome = import_questions(state.store.as_ref(), &request.items).await?;
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateRunRequest {
    campaign_id: String,
    providers: Vec<ProviderSpec>,
    #[serde(default = "default_prompt_version")]
    prompt_version: String,
    #[serde(default)]
    label: Option<String>,
}

fn default_prompt_version() -> String {
    "v1".into()
}

#[derive(Debug, Serialize)]
struct RunView {
    id: String,
    campaign_id: String,
    label: Option<String>,
    status: RunStatus,
    cost_cents: f64,
    counts: RunStatusCounts,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    errors: Vec<String>,
}

async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<CreateRunRequest>,
) -> Result<(StatusCode, Json<RunView>), ApiError> {
    if request.providers.is_empty() {
        return Err(ApiError::bad_request("at least one provider is required"));
    }
    // Admission gate: disabled providers are rejected before any unit
    // is materialized.
    for spec in &request.providers {
        if !state.providers.is_enabled(&spec.name) {
            return Err(ApiError::bad_request(format!(
                "Provider '{}' is not enabled. Enabled providers: {}",
                spec.name,
                state.providers.enabled_providers().join(", ")
            )));
        }
    }

    // Ensure the campaign exists before admitting.
    state.store.get_campaign(&request.campaign_id).await?;

    let run = Run {
        id: new_id(),
        campaign_id: request.campaign_id,
        label: request.label,
        spec: RunSpec {
            providers: request.providers,
            prompt_version: request.prompt_version,
        },
        status: RunStatus::Pending,
        cost_cents: 0.0,
        created_at: Utc::now(),
        started_at: None,
        finished_at: None,
    };
    state.store.create_run(run.clone()).await?;

    Ok((
        StatusCode::CREATED,
        Json(RunView {
            id: run.id,
            campaign_id: run.campaign_id,
            label: run.label,
            status: run.status,
            cost_cents: run.cost_cents,
            counts: RunStatusCounts::default(),
            created_at: run.created_at,
            started_at: None,
            finished_at: None,
            errors: vec![],
        }),
    ))
}

async fn start_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (items_created, items_enqueued) = asc_runtime::start_run(&state, &run_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "run_id": run_id,
            "status": "started",
            "items_created": items_created,
            "items_enqueued": items_enqueued,
        })),
    ))
}

async fn resume_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    // 404 for unknown runs rather than a silent zero.
    state.store.get_run(&run_id).await?;
    let items_resumed = asc_runtime::resume_run(&state, &run_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "run_id": run_id,
            "status": "resumed",
            "items_resumed": items_resumed,
        })),
    ))
}

async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunView>, ApiError> {
    let run = state.store.get_run(&run_id).await?;
    let counts = state.store.status_counts(&run_id).await?;
    let errors = state.store.sample_errors(&run_id, 10).await?;

    Ok(Json(RunView {
        id: run.id,
        campaign_id: run.campaign_id,
        label: run.label,
        status: run.status,
        cost_cents: run.cost_cents,
        counts,
        created_at: run.created_at,
        started_at: run.started_at,
        finished_at: run.finished_at,
        errors,
    }))
}

#[derive(Debug, Deserialize)]
struct ItemsQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    status: Option<String>,
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Serialize)]
struct RunItemView {
    id: String,
    run_id: String,
    question_id: String,
    status: ItemStatus,
    attempt_count: u32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

async fn get_run_items(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<Value>, ApiError> {
    if query.limit == 0 || query.limit > 1000 {
        return Err(ApiError::bad_request("limit must be between 1 and 1000"));
    }
    let status = match &query.status {
        Some(raw) => Some(
            serde_json::from_value::<ItemStatus>(json!(raw))
                .map_err(|_| ApiError::bad_request(format!("unknown status '{raw}'")))?,
        ),
        None => None,
    };

    state.store.get_run(&run_id).await?;
    let page = state
        .store
        .items_for_run(&run_id, status, query.limit, query.offset)
        .await?;

    let items: Vec<RunItemView> = page
        .items
        .into_iter()
        .map(|item| RunItemView {
            id: item.id,
            run_id: item.run_id,
            question_id: item.question_id,
            status: item.status,
            attempt_count: item.attempt_count,
            last_error: item.last_error,
            created_at: item.created_at,
            updated_at: item.updated_at,
        })
        .collect();

    let has_more = query.offset + items.len() < page.total;
    Ok(Json(json!({
        "items": items,
        "total": page.total,
        "limit": query.limit,
        "offset": query.offset,
        "has_more": has_more,
    })))
}

// ---------------------------------------------------------------------------
// Exports and deliveries
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    format: ExportFormat,
}

async fn download_results(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    state.store.get_run(&run_id).await?;
    match query.format {
        ExportFormat::Jsonl => {
            let records =
                asc_runtime::export::compose_records(state.store.as_ref(), &run_id).await?;
            let body = asc_runtime::encode_jsonl(&records);
            let filename = format!("run_{run_id}.jsonl");
            Ok((
                [
                    (header::CONTENT_TYPE, "application/x-ndjson".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{filename}\""),
                    ),
                ],
                body,
            )
                .into_response())
        }
        other => Err(ApiError::bad_request(format!(
            "format '{other}' is produced by the file-encoder service, not this API"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct CreateExportRequest {
    run_id: String,
    format: ExportFormat,
    #[serde(default)]
    mapper_name: Option<String>,
    #[serde(default = "default_mapper_version")]
    mapper_version: String,
    #[serde(default)]
    config: Value,
}

fn default_mapper_version() -> String {
    "v1".into()
}

async fn create_export(
    State(state): State<AppState>,
    Json(request): Json<CreateExportRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let export = asc_runtime::create_export(
        &state,
        &request.run_id,
        request.format,
        request.mapper_name,
        request.mapper_version,
        request.config,
    )
    .await?;
    let outcome = asc_runtime::run_export(&state, &export.id).await?;
    let export = state.store.get_export(&export.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": export.id,
            "run_id": export.run_id,
            "format": export.format,
            "mapper_name": export.mapper_name,
            "mapper_version": export.mapper_version,
            "status": export.status,
            "file_ref": export.file_ref,
            "created_at": export.created_at,
            "records": outcome.records,
            "deliveries_created": outcome.deliveries_created,
        })),
    ))
}

async fn get_export(
    State(state): State<AppState>,
    Path(export_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let export = state.store.get_export(&export_id).await?;
    let stats = state.store.delivery_stats(&export_id).await?;
    let failures = state.store.sample_failed_deliveries(&export_id, 5).await?;

    let delivery_stats: Value = stats
        .iter()
        .map(|(status, count)| (status.to_string(), json!(count)))
        .collect::<serde_json::Map<String, Value>>()
        .into();

    let sample_failures: Vec<Value> = failures
        .iter()
        .map(|d| {
            json!({
                "id": d.id,
                "last_error": d.last_error,
                "attempts": d.attempts,
                "updated_at": d.updated_at,
            })
        })
        .collect();

    Ok(Json(json!({
        "id": export.id,
        "run_id": export.run_id,
        "format": export.format,
        "mapper_name": export.mapper_name,
        "mapper_version": export.mapper_version,
        "status": export.status,
        "file_ref": export.file_ref,
        "created_at": export.created_at,
        "delivery_stats": delivery_stats,
        "sample_failures": sample_failures,
    })))
}

async fn get_delivery(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let delivery = state.store.get_delivery(&delivery_id).await?;
    Ok(Json(json!({
        "id": delivery.id,
        "export_id": delivery.export_id,
        "run_id": delivery.run_id,
        "mapper_name": delivery.mapper_name,
        "mapper_version": delivery.mapper_version,
        "status": delivery.status,
        "attempts": delivery.attempts,
        "last_error": delivery.last_error,
        "response_body": delivery.response_body,
        "created_at": delivery.created_at,
        "updated_at": delivery.updated_at,
    })))
}
