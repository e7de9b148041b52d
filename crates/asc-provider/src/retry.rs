// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared HTTP retry loop for adapter invocations.
//!
//! One POST per attempt; timeouts, connect failures, HTTP 429 and 5xx are
//! transient and retried with exponential backoff (base 2, capped at
//! 10 s). Any other non-2xx is a terminal rejection carrying the body.

use crate::ProviderError;
use std::time::Duration;
use tracing::warn;

/// Attempt budget per invocation.
pub(crate) const MAX_ATTEMPTS: u32 = 3;

const BACKOFF_CAP_SECS: f64 = 10.0;

/// Truncation bound for error bodies kept in `last_error`.
const ERROR_BODY_LIMIT: usize = 2000;

enum LastFailure {
    Status(u16),
    Transport(String),
}

pub(crate) fn truncate_body(body: String) -> String {
    if body.chars().count() > ERROR_BODY_LIMIT {
        body.chars().take(ERROR_BODY_LIMIT).collect()
    } else {
        body
    }
}

/// Send the request built by `build`, retrying transient failures.
pub(crate) async fn send_with_retry<F>(
    provider: &str,
    build: F,
) -> Result<reqwest::Response, ProviderError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last = LastFailure::Transport(String::from("no attempt made"));

    for attempt in 1..=MAX_ATTEMPTS {
        match build().send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp);
                }
                let code = status.as_u16();
                if code == 429 || status.is_server_error() {
                    warn!(provider, attempt, status = code, "transient provider status");
                    last = LastFailure::Status(code);
                } else {
                    let body = truncate_body(resp.text().await.unwrap_or_default());
                    return Err(ProviderError::Rejected { status: code, body });
                }
            }
            Err(err) => {
                warn!(provider, attempt, error = %err, "provider transport failure");
                last = LastFailure::Transport(err.to_string());
            }
        }

        if attempt < MAX_ATTEMPTS {
            let delay = 2f64.powi(attempt as i32).min(BACKOFF_CAP_SECS);
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        }
    }

    Err(match last {
        LastFailure::Status(status) => ProviderError::Unavailable {
            status,
            attempts: MAX_ATTEMPTS,
        },
        LastFailure::Transport(message) => ProviderError::Unreachable {
            attempts: MAX_ATTEMPTS,
            message,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_keeps_prefix() {
        let long = "x".repeat(ERROR_BODY_LIMIT + 10);
        assert_eq!(truncate_body(long).len(), ERROR_BODY_LIMIT);
        assert_eq!(truncate_body("short".into()), "short");
    }
}
