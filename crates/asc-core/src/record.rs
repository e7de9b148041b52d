// SPDX-License-Identifier: MIT OR Apache-2.0
//! Flat record shapes shared between the export composer, the file
//! encoders and the delivery mappers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::ItemStatus;

// ---------------------------------------------------------------------------
// TokenUsage
// ---------------------------------------------------------------------------

/// Token counts reported by a provider for one call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Tokens in the completion.
    #[serde(default)]
    pub completion_tokens: u64,
    /// Total tokens (prompt + completion as reported by the provider).
    #[serde(default)]
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Construct from prompt/completion counts, deriving the total.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

// ---------------------------------------------------------------------------
// ExportRecord
// ---------------------------------------------------------------------------

/// One flat row of the export stream: a run item joined with its question,
/// persona, topic and (when present) response.
///
/// The composer produces these in `RunItem.created_at` order; encoders and
/// mappers consume them without touching the store again.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportRecord {
    /// Run identifier.
    pub run_id: String,
    /// Run item identifier.
    pub run_item_id: String,
    /// Question identifier.
    pub question_id: String,
    /// Question text.
    pub question_text: String,
    /// Persona name.
    pub persona_name: String,
    /// Persona role.
    pub persona_role: Option<String>,
    /// Persona locale.
    pub persona_locale: Option<String>,
    /// Topic title.
    pub topic_title: String,
    /// Item status at composition time.
    pub status: ItemStatus,
    /// Attempts started.
    pub attempt_count: u32,
    /// Last error, if any attempt failed.
    pub last_error: Option<String>,
    /// Response fields; `None` for items without a response.
    #[serde(flatten)]
    pub response: Option<ResponseFields>,
}

/// Response-derived fields of an [`ExportRecord`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseFields {
    /// Provider that answered.
    pub provider: String,
    /// Model used.
    pub model: String,
    /// Prompt template version.
    pub prompt_version: String,
    /// The validated structured reply.
    pub response: Value,
    /// Plain answer text.
    pub answer: String,
    /// Citation URLs.
    pub citations: Vec<String>,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Call latency in milliseconds.
    pub latency_ms: u64,
    /// Cost in cents.
    pub cost_cents: f64,
}

impl ExportRecord {
    /// Whether this record corresponds to a succeeded unit with a response.
    pub fn is_deliverable(&self) -> bool {
        self.status == ItemStatus::Succeeded && self.response.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
