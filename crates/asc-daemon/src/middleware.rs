// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request authentication.

use crate::{ApiError, AppState};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

/// Reject requests whose `x-api-key` header is missing or not in the
/// configured key list.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(key) if state.config.api_keys.iter().any(|k| k == key) => next.run(request).await,
        Some(key) => {
            let prefix: String = key.chars().take(8).collect();
            warn!(key_prefix = %prefix, "invalid api key");
            ApiError::unauthorized("Invalid API key").into_response()
        }
        None => {
            warn!("missing api key");
            ApiError::unauthorized("API key required. Include x-api-key header.").into_response()
        }
    }
}
