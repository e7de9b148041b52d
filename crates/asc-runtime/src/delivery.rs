// SPDX-License-Identifier: MIT OR Apache-2.0
//! Delivery worker: POST mapped payloads to partner webhooks.
//!
//! Outcome classification is by HTTP class: 2xx succeeds, 4xx fails
//! terminally, 5xx / timeout / network faults retry with jittered
//! exponential backoff until the attempt budget is spent. A rate-limit
//! acquisition failure also retries but never reaches the wire.

use crate::{DELIVERY_ACQUIRE_DEADLINE_SECS, DeliveryTask, EngineContext, RuntimeError};
use asc_core::{Delivery, DeliveryStatus};
use asc_queue::ShutdownToken;
use asc_store::Store;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Partner response bodies are truncated to this length before storage.
const RESPONSE_BODY_LIMIT: usize = 5000;

/// Spawn `count` delivery workers consuming the context's delivery queue.
pub fn spawn_delivery_workers(
    ctx: Arc<EngineContext>,
    count: usize,
    shutdown: ShutdownToken,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker| {
            let ctx = ctx.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                info!(worker, "delivery worker started");
                while let Some(task) = ctx.delivery_queue.pop(&shutdown).await {
                    if let Err(err) = deliver(&ctx, &task).await {
                        error!(worker, delivery_id = %task.delivery_id, error = %err, "delivery task aborted");
                    }
                }
                info!(worker, "delivery worker stopped");
            })
        })
        .collect()
}

/// Jittered exponential backoff: `base^attempt ± 20%`, clamped to
/// `[1 s, 60 s]`. The jitter is mandatory — synchronized retries from a
/// fleet of workers would stampede the partner.
pub fn backoff_with_jitter(attempt: u32, base: f64) -> Duration {
    let base_delay = base.powi(attempt as i32);
    let jitter_range = base_delay * 0.2;
    let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
    Duration::from_secs_f64((base_delay + jitter).clamp(1.0, 60.0))
}

fn truncate(body: String) -> String {
    if body.chars().count() > RESPONSE_BODY_LIMIT {
        body.chars().take(RESPONSE_BODY_LIMIT).collect()
    } else {
        body
    }
}

enum AttemptOutcome {
    /// 2xx: terminal success.
    Succeeded { body: String },
    /// 4xx: terminal failure, never retried.
    Rejected { status: u16, body: String },
    /// 5xx / timeout / network fault: retriable.
    Transient { error: String, body: Option<String> },
    /// Rate-limit acquire failed: retriable, nothing reached the wire.
    Throttled,
}

/// Attempt one delivery and settle its new state.
pub async fn deliver(ctx: &EngineContext, task: &DeliveryTask) -> Result<(), RuntimeError> {
    let mut delivery = ctx.store.get_delivery(&task.delivery_id).await?;
    if delivery.status.is_terminal() {
        // Safety net for a duplicated queue message.
        return Ok(());
    }

    delivery.attempts += 1;
    delivery.updated_at = Utc::now();
    ctx.store.put_delivery(delivery.clone()).await?;

    info!(
        delivery_id = %delivery.id,
        attempt = delivery.attempts,
        mapper = %delivery.mapper_name,
        "delivery started"
    );

    // Unknown mappers are terminal: nothing to send, nothing to retry.
    if let Err(err) = ctx
        .mappers
        .get(&delivery.mapper_name, &delivery.mapper_version)
    {
        return settle_terminal(ctx, delivery, err.to_string(), None).await;
    }

    let export = ctx.store.get_export(&delivery.export_id).await?;
    let webhook_url = export.config["webhook_url"]
        .as_str()
        .map(str::to_string)
        .or_else(|| ctx.config.delivery.webhook_url.clone());
    let Some(webhook_url) = webhook_url else {
        return settle_terminal(ctx, delivery, "webhook_url not configured".into(), None).await;
    };

    let outcome = attempt_post(ctx, &delivery, &export.config, &webhook_url).await;

    match outcome {
        AttemptOutcome::Succeeded { body } => {
            delivery.status = DeliveryStatus::Succeeded;
            delivery.response_body = Some(truncate(body));
            delivery.updated_at = Utc::now();
            ctx.store.put_delivery(delivery.clone()).await?;
            info!(delivery_id = %delivery.id, attempts = delivery.attempts, "delivery succeeded");
            Ok(())
        }
        AttemptOutcome::Rejected { status, body } => {
            let body = truncate(body);
            let error = format!("HTTP {status}: {body}");
            error!(delivery_id = %delivery.id, status, "delivery failed with client error");
            settle_terminal(ctx, delivery, error, Some(body)).await
        }
        AttemptOutcome::Transient { error, body } => {
            delivery.last_error = Some(error.clone());
            if let Some(body) = body {
                delivery.response_body = Some(truncate(body));
            }
            retry_or_exhaust(ctx, delivery, error).await
        }
        AttemptOutcome::Throttled => {
            // The attempt counter moved, but no HTTP exchange happened.
            let error = "rate limit timeout".to_string();
            delivery.last_error = Some(error.clone());
            retry_or_exhaust(ctx, delivery, error).await
        }
    }
}

async fn settle_terminal(
    ctx: &EngineContext,
    mut delivery: Delivery,
    error: String,
    body: Option<String>,
) -> Result<(), RuntimeError> {
    delivery.status = DeliveryStatus::Failed;
    delivery.last_error = Some(error);
    if body.is_some() {
        delivery.response_body = body;
    }
    delivery.updated_at = Utc::now();
    ctx.store.put_delivery(delivery).await?;
    Ok(())
}

async fn retry_or_exhaust(
    ctx: &EngineContext,
    mut delivery: Delivery,
    error: String,
) -> Result<(), RuntimeError> {
    let max_attempts = ctx.config.delivery.max_attempts;
    if delivery.attempts < max_attempts {
        let countdown = backoff_with_jitter(delivery.attempts, ctx.config.delivery.backoff_base);
        warn!(
            delivery_id = %delivery.id,
            attempt = delivery.attempts,
            max_attempts,
            countdown_ms = countdown.as_millis() as u64,
            error = %error,
            "delivery will retry"
        );
        delivery.updated_at = Utc::now();
        ctx.store.put_delivery(delivery.clone()).await?;
        ctx.delivery_queue.push_after(
            DeliveryTask {
                delivery_id: delivery.id,
            },
            countdown,
        );
        Ok(())
    } else {
        error!(
            delivery_id = %delivery.id,
            attempts = delivery.attempts,
            "delivery attempts exhausted"
        );
        settle_terminal(ctx, delivery, error, None).await
    }
}

async fn attempt_post(
    ctx: &EngineContext,
    delivery: &Delivery,
    export_config: &serde_json::Value,
    webhook_url: &str,
) -> AttemptOutcome {
    // Per-mapper bucket, distinct from the per-provider buckets.
    let bucket = format!("partner_delivery_{}", delivery.mapper_name);
    let acquired = ctx
        .limiter
        .acquire(
            &bucket,
            ctx.config.delivery.qps,
            ctx.config.delivery.burst,
            Duration::from_secs(DELIVERY_ACQUIRE_DEADLINE_SECS),
        )
        .await;
    if acquired.is_err() {
        warn!(delivery_id = %delivery.id, bucket = %bucket, "delivery rate limited");
        return AttemptOutcome::Throttled;
    }

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(ctx.config.delivery.timeout_secs))
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            return AttemptOutcome::Transient {
                error: format!("client construction failed: {err}"),
                body: None,
            };
        }
    };

    // System default headers first, then per-export overrides.
    let mut request = client
        .post(webhook_url)
        .header("content-type", "application/json");
    for (name, value) in &ctx.config.delivery.headers {
        request = request.header(name, value);
    }
    if let Some(headers) = export_config.get("headers").and_then(|h| h.as_object()) {
        for (name, value) in headers {
            if let Some(value) = value.as_str() {
                request = request.header(name, value);
            }
        }
    }

    match request.json(&delivery.payload).send().await {
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            info!(
                delivery_id = %delivery.id,
                status = status.as_u16(),
                response_size = body.len(),
                "delivery response received"
            );
            if status.is_success() {
                AttemptOutcome::Succeeded { body }
            } else if status.is_client_error() {
                AttemptOutcome::Rejected {
                    status: status.as_u16(),
                    body,
                }
            } else {
                AttemptOutcome::Transient {
                    error: format!("HTTP {}: {}", status.as_u16(), truncate(body.clone())),
                    body: Some(body),
                }
            }
        }
        Err(err) if err.is_timeout() => AttemptOutcome::Transient {
            error: format!(
                "timeout after {}s",
                ctx.config.delivery.timeout_secs
            ),
            body: None,
        },
        Err(err) => AttemptOutcome::Transient {
            error: format!("network error: {err}"),
            body: None,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_stays_within_bounds() {
        for attempt in 1..=10 {
            for _ in 0..50 {
                let d = backoff_with_jitter(attempt, 2.0);
                assert!(d >= Duration::from_secs(1), "attempt {attempt}: {d:?}");
                assert!(d <= Duration::from_secs(60), "attempt {attempt}: {d:?}");
            }
        }
    }

    #[test]
    fn backoff_exhibits_variance() {
        let samples: Vec<Duration> = (0..50).map(|_| backoff_with_jitter(3, 2.0)).collect();
        let min = samples.iter().min().unwrap();
        let max = samples.iter().max().unwrap();
        // ±20% around 8 s leaves ample measurable spread.
        assert!(max > min, "no jitter observed across samples");
    }

    #[test]
    fn backoff_grows_with_attempts_until_the_cap() {
        let low: Duration = backoff_with_jitter(1, 2.0);
        assert!(low <= Duration::from_secs_f64(2.4 + f64::EPSILON));
        // base^7 = 128 → always clamped to the 60 s ceiling.
        let capped = backoff_with_jitter(7, 2.0);
        assert_eq!(capped, Duration::from_secs(60));
    }

    #[test]
    fn truncation_bounds_stored_bodies() {
        let long = "y".repeat(RESPONSE_BODY_LIMIT * 2);
        assert_eq!(truncate(long).len(), RESPONSE_BODY_LIMIT);
        assert_eq!(truncate("ok".into()), "ok");
    }
}
