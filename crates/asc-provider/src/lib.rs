// SPDX-License-Identifier: MIT OR Apache-2.0
//! Provider adapters for the answer engines.
//!
//! Each adapter owns one wire contract: it assembles the prompt, performs
//! the HTTP call under the determinism-first policy, validates the
//! structured reply against the fixed answer schema (with a synthesized
//! fallback on violation), normalizes citations, and prices the call from
//! the static table. Callers treat [`ProviderRequest`] as opaque.
//!
//! The [`ProviderRegistry`] gates which adapters are invocable at runtime
//! via feature flags; disabled providers fail at lookup with a
//! well-defined error.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod citations;
mod gemini;
mod openai;
mod perplexity;
mod pricing;
mod prompt;
mod registry;
mod retry;
mod validate;

pub use citations::normalize_citations;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use perplexity::PerplexityAdapter;
pub use pricing::{PriceTable, round_to_4};
pub use prompt::{PromptInputs, render_user_prompt, system_prompt};
pub use registry::ProviderRegistry;
pub use validate::{ValidatedReply, strip_code_fence, validate_reply};

use asc_config::DeterminismConfig;
use asc_core::TokenUsage;
use asc_error::ErrorCode;
use async_trait::async_trait;
use serde_json::Value;

/// Per-attempt HTTP timeout for provider calls.
pub const PROVIDER_TIMEOUT_SECS: u64 = 60;

/// Fixed seed sent to providers that support one, when sampling is off.
pub const DETERMINISTIC_SEED: u64 = 42;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by adapter invocation and registry lookup.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Every attempt timed out or failed at the transport level.
    #[error("provider unreachable after {attempts} attempts: {message}")]
    Unreachable {
        /// Attempts performed.
        attempts: u32,
        /// Last transport error message.
        message: String,
    },

    /// The provider rejected the request with a non-429 4xx.
    #[error("provider returned HTTP {status}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The provider answered 429/5xx on every attempt.
    #[error("provider returned HTTP {status} on every attempt ({attempts})")]
    Unavailable {
        /// Last HTTP status observed.
        status: u16,
        /// Attempts performed.
        attempts: u32,
    },

    /// A 2xx reply did not carry the fields the wire contract requires.
    #[error("malformed provider reply: {0}")]
    MalformedReply(String),

    /// Registry lookup hit a provider whose feature flag is off.
    #[error("provider '{0}' is not enabled")]
    Disabled(String),

    /// Registry lookup missed entirely.
    #[error("unknown provider '{0}'")]
    Unknown(String),
}

impl ProviderError {
    /// Stable error code for the taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unreachable { .. } => ErrorCode::ProviderUnreachable,
            Self::Rejected { .. } => ErrorCode::ProviderRejected,
            Self::Unavailable { .. } => ErrorCode::ProviderUnavailable,
            Self::MalformedReply(_) => ErrorCode::ProviderMalformedReply,
            Self::Disabled(_) => ErrorCode::ValidationProviderDisabled,
            Self::Unknown(_) => ErrorCode::ValidationUnknownProvider,
        }
    }

    /// Whether the execution worker should schedule another unit attempt.
    pub fn is_retriable(&self) -> bool {
        self.code().retriability() == asc_error::Retriability::Retriable
    }
}

// ---------------------------------------------------------------------------
// Request / result shapes
// ---------------------------------------------------------------------------

/// A prepared prompt, opaque to callers; the adapter owns the wire format.
#[derive(Clone, Debug)]
pub struct ProviderRequest {
    /// Wire-format prompt body (messages / contents).
    pub body: Value,
    /// Prompt template version that produced it.
    pub prompt_version: String,
}

/// Resolved invocation settings for one call.
///
/// Constructed from the merged `(provider spec ∪ question overrides)`
/// object with the configured defaults filled in; the determinism-first
/// override is applied by [`InvokeSettings::sampling_params`].
#[derive(Clone, Debug, PartialEq)]
pub struct InvokeSettings {
    /// Model identifier.
    pub model: String,
    /// Requested temperature (before the determinism override).
    pub temperature: f64,
    /// Requested top-p (before the determinism override).
    pub top_p: f64,
    /// Completion token budget.
    pub max_tokens: u32,
    /// Whether caller-supplied sampling parameters are honored.
    pub allow_sampling: bool,
}

impl InvokeSettings {
    /// Build settings from a merged settings object, filling gaps from the
    /// configured determinism defaults.
    pub fn from_settings(settings: &Value, defaults: &DeterminismConfig) -> Self {
        Self {
            model: settings
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            temperature: settings
                .get("temperature")
                .and_then(Value::as_f64)
                .unwrap_or(defaults.default_temperature),
            top_p: settings
                .get("top_p")
                .and_then(Value::as_f64)
                .unwrap_or(defaults.default_top_p),
            max_tokens: settings
                .get("max_tokens")
                .and_then(Value::as_u64)
                .map(|v| v as u32)
                .unwrap_or(defaults.default_max_tokens),
            allow_sampling: settings
                .get("allow_sampling")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    /// The `(temperature, top_p)` actually sent on the wire.
    ///
    /// With sampling disallowed (the default) both are pinned to their
    /// lowest-variance values regardless of what the caller asked for.
    pub fn sampling_params(&self) -> (f64, f64) {
        if self.allow_sampling {
            (self.temperature, self.top_p)
        } else {
            (0.0, 1.0)
        }
    }
}

/// The outcome of one successful adapter invocation.
#[derive(Clone, Debug)]
pub struct ProviderResult {
    /// Plain answer text (the schema's `answer`, or the raw body on
    /// validation fallback).
    pub text: String,
    /// Ordered, de-duplicated, http(s)-only citation URLs.
    pub citations: Vec<String>,
    /// The schema-validated reply, or the synthesized fallback object.
    pub validated: Value,
    /// Token usage reported by the provider.
    pub usage: TokenUsage,
    /// Wall-clock latency of the winning attempt chain, in milliseconds.
    pub latency_ms: u64,
    /// Cost of the call in cents, rounded to 4 decimals.
    pub cost_cents: f64,
}

// ---------------------------------------------------------------------------
// Adapter trait
// ---------------------------------------------------------------------------

/// One answer-engine integration.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry name of this provider.
    fn name(&self) -> &'static str;

    /// Assemble the wire-format prompt for one question.
    fn prepare_prompt(&self, inputs: &PromptInputs) -> ProviderRequest;

    /// Perform the HTTP call: one POST per attempt with a 60 s timeout,
    /// up to 3 attempts with exponential backoff on transient failures.
    async fn invoke(
        &self,
        request: &ProviderRequest,
        settings: &InvokeSettings,
    ) -> Result<ProviderResult, ProviderError>;

    /// Price a call from the static table; unknown models cost 0.
    fn compute_cost(&self, model: &str, usage: &TokenUsage) -> f64;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> DeterminismConfig {
        DeterminismConfig::default()
    }

    #[test]
    fn settings_fill_gaps_from_defaults() {
        let s = InvokeSettings::from_settings(&json!({"model": "gpt-4o-mini"}), &defaults());
        assert_eq!(s.model, "gpt-4o-mini");
        assert_eq!(s.temperature, 0.0);
        assert_eq!(s.top_p, 1.0);
        assert_eq!(s.max_tokens, 1000);
        assert!(!s.allow_sampling);
    }

    #[test]
    fn sampling_disallowed_pins_parameters() {
        let s = InvokeSettings::from_settings(
            &json!({"model": "m", "temperature": 0.9, "top_p": 0.5}),
            &defaults(),
        );
        // Caller-supplied values are overridden when sampling is off.
        assert_eq!(s.sampling_params(), (0.0, 1.0));
    }

    #[test]
    fn sampling_opt_in_honors_caller_values() {
        let s = InvokeSettings::from_settings(
            &json!({"model": "m", "temperature": 0.9, "top_p": 0.5, "allow_sampling": true}),
            &defaults(),
        );
        assert_eq!(s.sampling_params(), (0.9, 0.5));
    }

    #[test]
    fn error_codes_classify_retriability() {
        assert!(
            ProviderError::Unreachable {
                attempts: 3,
                message: "timeout".into()
            }
            .is_retriable()
        );
        assert!(
            ProviderError::Unavailable {
                status: 503,
                attempts: 3
            }
            .is_retriable()
        );
        assert!(
            !ProviderError::Rejected {
                status: 400,
                body: String::new()
            }
            .is_retriable()
        );
        assert!(!ProviderError::Disabled("gemini".into()).is_retriable());
    }
}
