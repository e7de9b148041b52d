// SPDX-License-Identifier: MIT OR Apache-2.0
//! Run materialization: expand a run spec into work units.

use crate::{EngineContext, ExecTask, RuntimeError};
use asc_core::{ItemStatus, RunItem, fingerprint, merge_settings, new_id};
use asc_store::Store;
use chrono::Utc;
use tracing::{debug, info};

/// Expand the run into one pending item per `(question × provider spec)`.
///
/// The fingerprint is the idempotency key: an item whose fingerprint
/// already exists anywhere is silently skipped, so repeated
/// materialization of the same run creates nothing new. Returns the
/// number of newly created items.
pub async fn materialize_run(ctx: &EngineContext, run_id: &str) -> Result<usize, RuntimeError> {
    let run = ctx.store.get_run(run_id).await?;
    let questions = ctx.store.questions_for_campaign(&run.campaign_id).await?;

    info!(
        run_id,
        questions = questions.len(),
        providers = run.spec.providers.len(),
        "materializing run items"
    );

    let mut created = 0usize;
    for question in &questions {
        let overrides = question.provider_overrides();
        for spec in &run.spec.providers {
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

            let now = Utc::now();
            let inserted = ctx
                .store
                .insert_item_if_absent(RunItem {
                    id: new_id(),
                    run_id: run.id.clone(),
                    question_id: question.id.clone(),
                    fingerprint: key.clone(),
                    status: ItemStatus::Pending,
                    attempt_count: 0,
                    last_error: None,
                    created_at: now,
                    updated_at: now,
                })
                .await?;

            if inserted {
                created += 1;
            } else {
                debug!(fingerprint = &key[..16], "run item skipped, duplicate fingerprint");
            }
        }
    }

    info!(run_id, created, "run items materialized");
    Ok(created)
}

/// Materialize the run and enqueue every pending item. Returns
/// `(items_created, items_enqueued)`.
pub async fn start_run(ctx: &EngineContext, run_id: &str) -> Result<(usize, usize), RuntimeError> {
    let created = materialize_run(ctx, run_id).await?;

    let pending = ctx
        .store
        .items_for_run(run_id, Some(ItemStatus::Pending), usize::MAX, 0)
        .await?;
    for item in &pending.items {
        ctx.exec_queue.push(ExecTask {
            run_item_id: item.id.clone(),
            retry: false,
        });
    }

    info!(run_id, created, enqueued = pending.items.len(), "run started");
    Ok((created, pending.items.len()))
}

/// Reset every failed item to pending and re-enqueue it. Returns the
/// number of items resumed.
pub async fn resume_run(ctx: &EngineContext, run_id: &str) -> Result<usize, RuntimeError> {
    let failed = ctx
        .store
        .items_for_run(run_id, Some(ItemStatus::Failed), usize::MAX, 0)
        .await?;

    for item in &failed.items {
        let mut item = item.clone();
        item.status = ItemStatus::Pending;
        item.updated_at = Utc::now();
        ctx.store.put_item(item.clone()).await?;
        ctx.exec_queue.push(ExecTask {
            run_item_id: item.id,
            retry: false,
        });
    }

    info!(run_id, resumed = failed.items.len(), "run resumed");
    Ok(failed.items.len())
}
