// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-process router tests for the control surface.

use asc_config::EngineConfig;
use asc_daemon::build_app;
use asc_mapper::MapperRegistry;
use asc_provider::ProviderRegistry;
use asc_queue::TaskQueue;
use asc_ratelimit::{MemoryCoordination, RateLimiter};
use asc_runtime::EngineContext;
use asc_store::MemoryStore;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::util::ServiceExt;

const API_KEY: &str = "dev-key-123";

fn app() -> Router {
    let config = EngineConfig::default();
    let providers = Arc::new(ProviderRegistry::from_config(&config));
    let state = Arc::new(EngineContext {
        store: Arc::new(MemoryStore::new()),
        providers,
        limiter: Arc::new(RateLimiter::new(Arc::new(MemoryCoordination::new()))),
        mappers: Arc::new(MapperRegistry::with_builtins()),
        config,
        exec_queue: Arc::new(TaskQueue::new()),
        delivery_queue: Arc::new(TaskQueue::new()),
    });
    build_app(state)
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap()
}

fn post_json(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("x-api-key", API_KEY)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_needs_no_key() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["providers"][0], "openai");
}

#[tokio::test]
async fn protected_routes_reject_missing_or_bad_keys() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/v1/campaigns")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/v1/campaigns")
                .header("x-api-key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn campaign_create_and_fetch_roundtrip() {
    let app = app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/campaigns",
            json!({"name": "C", "product_name": "Widget"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/campaigns/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["name"], "C");

    // Duplicate names are a conflict at admission.
    let response = app
        .oneshot(post_json("/api/v1/campaigns", json!({"name": "C"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn run_admission_rejects_disabled_providers() {
    let app = app();
    let response = app
        .clone()
        .oneshot(post_json("/api/v1/campaigns", json!({"name": "C"})))
        .await
        .unwrap();
    let campaign = body_json(response).await;

    let response = app
        .oneshot(post_json(
            "/api/v1/runs",
            json!({
                "campaign_id": campaign["id"],
                "providers": [{"name": "gemini", "model": "gemini-pro"}]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(
        body["detail"]
            .as_str()
            .unwrap()
            .contains("'gemini' is not enabled")
    );
}

#[tokio::test]
async fn run_admission_rejects_unknown_campaign_and_empty_providers() {
    let response = app()
        .oneshot(post_json(
            "/api/v1/runs",
            json!({
                "campaign_id": "missing",
                "providers": [{"name": "openai", "model": "gpt-4o-mini"}]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app()
        .oneshot(post_json(
            "/api/v1/runs",
            json!({"campaign_id": "x", "providers": []}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn import_reports_counts_and_is_idempotent() {
    let app = app();
    let batch = json!({"items": [{
        "campaign": "C",
        "topic": {"title": "Battery"},
        "persona": {"name": "Reviewer"},
        "question": {"external_id": "Q1", "text": "How long does the battery last?"}
    }]});

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/ingest/questions", batch.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["imported"], 1);
    assert_eq!(body["skipped"], 0);

    let response = app
        .oneshot(post_json("/api/v1/ingest/questions", batch))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["imported"], 0);
    assert_eq!(body["skipped"], 1);
}

#[tokio::test]
async fn run_lifecycle_over_http() {
    let app = app();

    // Import one question, admit a run, start it. No worker is draining
    // the queue in this test, so the run stays pending with one unit.
    app.clone()
        .oneshot(post_json(
            "/api/v1/ingest/questions",
            json!({"items": [{
                "campaign": "C",
                "topic": {"title": "Battery"},
                "persona": {"name": "Reviewer"},
                "question": {"external_id": "Q1", "text": "How long?"}
            }]}),
        ))
        .await
        .unwrap();

    let response = app.clone().oneshot(get("/api/v1/campaigns")).await.unwrap();
    let campaigns = body_json(response).await;
    let campaign_id = campaigns[0]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/runs",
            json!({
                "campaign_id": campaign_id,
                "providers": [{"name": "openai", "model": "gpt-4o-mini"}]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let run = body_json(response).await;
    let run_id = run["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_json(&format!("/api/v1/runs/{run_id}/start"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let started = body_json(response).await;
    assert_eq!(started["items_created"], 1);
    assert_eq!(started["items_enqueued"], 1);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/runs/{run_id}")))
        .await
        .unwrap();
    let run = body_json(response).await;
    assert_eq!(run["counts"]["total"], 1);
    assert_eq!(run["counts"]["pending"], 1);

    let response = app
        .oneshot(get(&format!("/api/v1/runs/{run_id}/items?limit=10")))
        .await
        .unwrap();
    let items = body_json(response).await;
    assert_eq!(items["total"], 1);
    assert_eq!(items["items"][0]["status"], "pending");
    assert_eq!(items["has_more"], false);
}

#[tokio::test]
async fn items_pagination_limits_are_validated() {
    let app = app();
    app.clone()
        .oneshot(post_json("/api/v1/campaigns", json!({"name": "C"})))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get("/api/v1/runs/whatever/items?limit=2000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(get("/api/v1/runs/whatever/items?status=exploded"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn download_supports_jsonl_only() {
    let app = app();
    let response = app
        .clone()
        .oneshot(post_json("/api/v1/campaigns", json!({"name": "C"})))
        .await
        .unwrap();
    let campaign = body_json(response).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/runs",
            json!({
                "campaign_id": campaign["id"],
                "providers": [{"name": "openai", "model": "gpt-4o-mini"}]
            }),
        ))
        .await
        .unwrap();
    let run = body_json(response).await;
    let run_id = run["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!(
            "/api/v1/runs/{run_id}/results:download?format=jsonl"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get(&format!(
            "/api/v1/runs/{run_id}/results:download?format=csv"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_entities_return_404() {
    let response = app().oneshot(get("/api/v1/runs/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app().oneshot(get("/api/v1/exports/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app().oneshot(get("/api/v1/deliveries/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
