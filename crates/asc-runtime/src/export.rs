// SPDX-License-Identifier: MIT OR Apache-2.0
//! Export composition: join items and responses into a flat record
//! stream, and fan out partner deliveries for mapped exports.

use crate::{DeliveryTask, EngineContext, RuntimeError};
use asc_core::{
    Delivery, DeliveryStatus, Export, ExportFormat, ExportRecord, ExportStatus, ItemStatus,
    ResponseFields, new_id,
};
use asc_store::Store;
use chrono::Utc;
use serde_json::Value;
use tracing::{error, info};

/// Compose the flat record stream for one run, ordered by item creation.
///
/// Pure with respect to the store: nothing is mutated, absent responses
/// simply leave the response fields empty.
pub async fn compose_records(
    store: &dyn Store,
    run_id: &str,
) -> Result<Vec<ExportRecord>, RuntimeError> {
    let page = store.items_for_run(run_id, None, usize::MAX, 0).await?;

    let mut records = Vec::with_capacity(page.items.len());
    for item in page.items {
        let question = store.get_question(&item.question_id).await?;
        let topic = store.get_topic(&question.topic_id).await?;
        let persona = store.get_persona(&question.persona_id).await?;
        let response = store.response_for_item(&item.id).await?;

        records.push(ExportRecord {
            run_id: run_id.to_string(),
            run_item_id: item.id.clone(),
            question_id: question.id.clone(),
            question_text: question.text.clone(),
            persona_name: persona.name.clone(),
            persona_role: persona.role.clone(),
            persona_locale: persona.locale.clone(),
            topic_title: topic.title.clone(),
            status: item.status,
            attempt_count: item.attempt_count,
            last_error: item.last_error.clone(),
            response: response.map(|r| ResponseFields {
                provider: r.provider,
                model: r.model,
                prompt_version: r.prompt_version,
                response: r.response,
                answer: r.text,
                citations: r.citations,
                token_usage: r.token_usage,
                latency_ms: r.latency_ms,
                cost_cents: r.cost_cents,
            }),
        });
    }
    Ok(records)
}

/// Encode records as JSON Lines (one object per row).
pub fn encode_jsonl(records: &[ExportRecord]) -> String {
    let mut out = String::new();
    for record in records {
        // ExportRecord is plain data; serialization cannot fail.
        out.push_str(&serde_json::to_string(record).expect("record serializes"));
        out.push('\n');
    }
    out
}

/// Admit an export request. A named mapper is resolved eagerly so an
/// unknown `name@version` is rejected here, not at delivery time.
pub async fn create_export(
    ctx: &EngineContext,
    run_id: &str,
    format: ExportFormat,
    mapper_name: Option<String>,
    mapper_version: String,
    config: Value,
) -> Result<Export, RuntimeError> {
    if let Some(name) = &mapper_name {
        ctx.mappers.get(name, &mapper_version)?;
    }

    let now = Utc::now();
    let export = Export {
        id: new_id(),
        run_id: run_id.to_string(),
        format,
        mapper_name,
        mapper_version,
        config,
        status: ExportStatus::Pending,
        file_ref: None,
        created_at: now,
        updated_at: now,
    };
    ctx.store.create_export(export.clone()).await?;

    info!(
        export_id = %export.id,
        run_id,
        format = %export.format,
        mapper = export.mapper_name.as_deref().unwrap_or("-"),
        "export created"
    );
    Ok(export)
}

/// Result of running one export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportOutcome {
    /// Records composed.
    pub records: usize,
    /// Deliveries created and enqueued (mapped exports only).
    pub deliveries_created: usize,
}

/// Execute one export: compose records and, when a mapper is named,
/// create and enqueue one delivery per succeeded unit.
pub async fn run_export(ctx: &EngineContext, export_id: &str) -> Result<ExportOutcome, RuntimeError> {
    let mut export = ctx.store.get_export(export_id).await?;
    export.status = ExportStatus::Processing;
    export.updated_at = Utc::now();
    ctx.store.put_export(export.clone()).await?;

    match compose_and_fan_out(ctx, &export).await {
        Ok(outcome) => {
            export.status = ExportStatus::Completed;
            export.updated_at = Utc::now();
            ctx.store.put_export(export.clone()).await?;
            info!(
                export_id,
                records = outcome.records,
                deliveries = outcome.deliveries_created,
                "export completed"
            );
            Ok(outcome)
        }
        Err(err) => {
            error!(export_id, error = %err, "export failed");
            export.status = ExportStatus::Failed;
            export.updated_at = Utc::now();
            ctx.store.put_export(export).await?;
            Err(err)
        }
    }
}

async fn compose_and_fan_out(
    ctx: &EngineContext,
    export: &Export,
) -> Result<ExportOutcome, RuntimeError> {
    let records = compose_records(ctx.store.as_ref(), &export.run_id).await?;
    let mut outcome = ExportOutcome {
        records: records.len(),
        deliveries_created: 0,
    };

    let Some(mapper_name) = &export.mapper_name else {
        return Ok(outcome);
    };
    let mapper = ctx.mappers.get(mapper_name, &export.mapper_version)?;

    for record in records.iter().filter(|r| r.status == ItemStatus::Succeeded) {
        let now = Utc::now();
        let delivery = Delivery {
            id: new_id(),
            export_id: export.id.clone(),
            run_id: export.run_id.clone(),
            mapper_name: mapper_name.clone(),
            mapper_version: export.mapper_version.clone(),
            payload: mapper.map(record),
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_error: None,
            response_body: None,
            created_at: now,
            updated_at: now,
        };
        ctx.store.create_delivery(delivery.clone()).await?;
        ctx.delivery_queue.push(DeliveryTask {
            delivery_id: delivery.id,
        });
        outcome.deliveries_created += 1;
    }

    Ok(outcome)
}
