// SPDX-License-Identifier: MIT OR Apache-2.0
//! Execution worker: drive one run item through its state machine.

use crate::{
    EXEC_ACQUIRE_DEADLINE_SECS, EXEC_MAX_ATTEMPTS, EngineContext, ExecTask, RuntimeError, rollup,
};
use asc_core::{
    ItemStatus, ProviderSpec, Question, Response, Run, RunItem, fingerprint, merge_settings,
    new_id,
};
use asc_provider::{InvokeSettings, PromptInputs};
use asc_queue::ShutdownToken;
use asc_store::Store;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Spawn `count` execution workers consuming the context's exec queue.
///
/// Workers drain until the shutdown token triggers; an in-flight unit
/// finishes its current exchange and commits its transition before the
/// worker exits.
pub fn spawn_execution_workers(
    ctx: Arc<EngineContext>,
    count: usize,
    shutdown: ShutdownToken,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker| {
            let ctx = ctx.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                info!(worker, "execution worker started");
                while let Some(task) = ctx.exec_queue.pop(&shutdown).await {
                    if let Err(err) = execute_item(&ctx, &task).await {
                        // Only infrastructure errors land here; unit
                        // failures are absorbed into the item row.
                        error!(worker, run_item_id = %task.run_item_id, error = %err, "task aborted");
                    }
                }
                info!(worker, "execution worker stopped");
            })
        })
        .collect()
}

/// Execute one task end to end. Unit failures never escape: they are
/// recorded on the item, optionally rescheduled, and rolled up.
pub async fn execute_item(ctx: &EngineContext, task: &ExecTask) -> Result<(), RuntimeError> {
    let Some(item) = ctx.store.claim_item(&task.run_item_id, task.retry).await? else {
        debug!(run_item_id = %task.run_item_id, "item not claimable, skipping");
        return Ok(());
    };

    info!(
        run_item_id = %item.id,
        attempt = item.attempt_count,
        retry = task.retry,
        "run item started"
    );

    match attempt_item(ctx, &item).await {
        Ok(response) => {
            let cost_cents = response.cost_cents;
            ctx.store.upsert_response(response).await?;

            let mut item = item;
            item.status = ItemStatus::Succeeded;
            item.last_error = None;
            item.updated_at = Utc::now();
            ctx.store.put_item(item.clone()).await?;

            info!(run_item_id = %item.id, cost_cents, "run item succeeded");
            rollup::update_run(ctx, &item.run_id).await?;
        }
        Err(err) => {
            warn!(
                run_item_id = %item.id,
                attempt = item.attempt_count,
                error = %err,
                "run item failed"
            );

            let mut item = item;
            item.status = ItemStatus::Failed;
            item.last_error = Some(err.to_string());
            item.updated_at = Utc::now();
            ctx.store.put_item(item.clone()).await?;

            // Execution-layer backoff: 2^attempts seconds, deliberately
            // unjittered (the delivery pipeline is the jittered one).
            if item.attempt_count < EXEC_MAX_ATTEMPTS && err.is_retriable() {
                let countdown = Duration::from_secs(2u64.pow(item.attempt_count));
                debug!(
                    run_item_id = %item.id,
                    countdown_secs = countdown.as_secs(),
                    "scheduling unit retry"
                );
                ctx.exec_queue.push_after(
                    ExecTask {
                        run_item_id: item.id.clone(),
                        retry: true,
                    },
                    countdown,
                );
            }
            rollup::update_run(ctx, &item.run_id).await?;
        }
    }

    Ok(())
}

/// Locate the provider spec this item was materialized from by matching
/// its content-addressed fingerprint.
fn resolve_spec<'run>(
    run: &'run Run,
    question: &Question,
    item: &RunItem,
) -> Option<(&'run ProviderSpec, serde_json::Value)> {
    let overrides = question.provider_overrides();
    run.spec.providers.iter().find_map(|spec| {
        let merged = merge_settings(&spec.as_settings(), &overrides);
        let key = fingerprint(
            &spec.name,
            &spec.model,
            &run.spec.prompt_version,
            &question.id,
            &question.persona_id,
            &question.text,
            &merged,
        );
        (key == item.fingerprint).then_some((spec, merged))
    })
}

/// One attempt: resolve the adapter, gate on the rate limiter, invoke,
/// and build the response row.
async fn attempt_item(ctx: &EngineContext, item: &RunItem) -> Result<Response, RuntimeError> {
    let run = ctx.store.get_run(&item.run_id).await?;
    let question = ctx.store.get_question(&item.question_id).await?;
    let topic = ctx.store.get_topic(&question.topic_id).await?;
    let persona = ctx.store.get_persona(&question.persona_id).await?;

    let (spec, merged) =
        resolve_spec(&run, &question, item).ok_or_else(|| RuntimeError::OrphanedItem {
            run_item_id: item.id.clone(),
        })?;
    let settings = InvokeSettings::from_settings(&merged, &ctx.config.determinism);

    // Disabled providers fail the unit terminally (registry gate).
    let adapter = ctx.providers.get(&spec.name)?;

    let (qps, burst) = ctx.config.provider_rate_limits(&spec.name);
    ctx.limiter
        .acquire(
            &spec.name,
            qps,
            burst,
            Duration::from_secs(EXEC_ACQUIRE_DEADLINE_SECS),
        )
        .await?;

    let inputs = PromptInputs {
        question_text: question.text.clone(),
        topic_title: topic.title.clone(),
        persona_name: persona.name.clone(),
        persona_role: persona.role.clone().unwrap_or_default(),
        persona_tone: persona.tone.clone().unwrap_or_else(|| "neutral".into()),
        prompt_version: run.spec.prompt_version.clone(),
    };
    let request = adapter.prepare_prompt(&inputs);
    let result = adapter.invoke(&request, &settings).await?;

    Ok(Response {
        id: new_id(),
        run_item_id: item.id.clone(),
        provider: spec.name.clone(),
        model: settings.model.clone(),
        prompt_version: request.prompt_version.clone(),
        request: request.body,
        response: result.validated,
        text: result.text,
        citations: result.citations,
        token_usage: result.usage,
        latency_ms: result.latency_ms,
        cost_cents: result.cost_cents,
        created_at: Utc::now(),
    })
}
