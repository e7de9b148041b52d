// SPDX-License-Identifier: MIT OR Apache-2.0
//! Run rollup: derive the parent run's status and cost from its items.

use crate::{EngineContext, RuntimeError};
use asc_core::{Run, RunStatus};
use asc_provider::round_to_4;
use asc_store::Store;
use chrono::Utc;
use tracing::info;

/// Recompute the run's per-status counts, cost sum and status.
///
/// The new state is a pure function of the current item rows, so
/// concurrent rollups from parallel workers converge; the write is
/// last-writer-wins on purpose.
pub async fn update_run(ctx: &EngineContext, run_id: &str) -> Result<Run, RuntimeError> {
    let counts = ctx.store.status_counts(run_id).await?;
    let cost = ctx.store.sum_cost(run_id).await?;
    let mut run = ctx.store.get_run(run_id).await?;

    run.cost_cents = round_to_4(cost);

    let next = counts.run_status();
    match next {
        RunStatus::Running if run.started_at.is_none() => {
            run.started_at = Some(Utc::now());
        }
        RunStatus::Completed if run.finished_at.is_none() => {
            // A run that never saw an in-flight rollup still gets a start.
            if run.started_at.is_none() {
                run.started_at = Some(Utc::now());
            }
            run.finished_at = Some(Utc::now());
        }
        _ => {}
    }

    if run.status != next {
        info!(run_id, from = %run.status, to = %next, "run status updated");
    }
    run.status = next;

    ctx.store.put_run(run.clone()).await?;
    Ok(run)
}
