// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured-reply validation with fallback.
//!
//! Providers are instructed to answer with a single JSON object:
//!
//! ```json
//! { "answer": "...", "citations": ["https://..."], "meta": {} }
//! ```
//!
//! The body may arrive inside a fenced code block, which is stripped
//! before parsing. On any parse or schema violation the reply degrades to
//! a synthesized object carrying the raw body as `answer` and the failure
//! reason under `meta.validation_error` — validation never fails a unit on
//! its own.

use serde_json::{Value, json};
use std::sync::OnceLock;
use tracing::{debug, warn};

fn reply_validator() -> &'static jsonschema::Validator {
    static VALIDATOR: OnceLock<jsonschema::Validator> = OnceLock::new();
    VALIDATOR.get_or_init(|| {
        let schema = json!({
            "type": "object",
            "required": ["answer"],
            "properties": {
                "answer": {"type": "string"},
                "citations": {
                    "type": "array",
                    "items": {"type": "string"},
                    "default": []
                },
                "meta": {"type": "object"}
            },
            "additionalProperties": false
        });
        jsonschema::validator_for(&schema).expect("reply schema compiles")
    })
}

/// Strip a leading ```` ```json ```` (or bare ```` ``` ````) fence and its
/// matching closer, returning the inner body. Without a fence the input is
/// returned trimmed.
pub fn strip_code_fence(content: &str) -> &str {
    if let Some(start) = content.find("```json") {
        let inner = &content[start + 7..];
        let end = inner.find("```").unwrap_or(inner.len());
        inner[..end].trim()
    } else if let Some(start) = content.find("```") {
        let inner = &content[start + 3..];
        let end = inner.find("```").unwrap_or(inner.len());
        inner[..end].trim()
    } else {
        content.trim()
    }
}

/// A reply after validation.
#[derive(Clone, Debug)]
pub struct ValidatedReply {
    /// Schema-valid reply, or the fallback object.
    pub value: Value,
    /// Plain answer text.
    pub answer: String,
    /// Citations as claimed inside the JSON body (not yet URL-filtered).
    pub citations: Vec<String>,
    /// The validation failure, when the fallback path was taken.
    pub validation_error: Option<String>,
}

/// Parse and validate one provider reply body.
pub fn validate_reply(content: &str) -> ValidatedReply {
    let body = strip_code_fence(content);

    let outcome = serde_json::from_str::<Value>(body)
        .map_err(|e| format!("invalid JSON: {e}"))
        .and_then(|parsed| match reply_validator().validate(&parsed) {
            Ok(()) => Ok(parsed),
            Err(e) => Err(format!("schema violation: {e}")),
        });

    match outcome {
        Ok(parsed) => {
            debug!("reply validation succeeded");
            let answer = parsed
                .get("answer")
                .and_then(Value::as_str)
                .unwrap_or(content)
                .to_string();
            let citations = parsed
                .get("citations")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            ValidatedReply {
                value: parsed,
                answer,
                citations,
                validation_error: None,
            }
        }
        Err(reason) => {
            let preview: String = content.chars().take(200).collect();
            warn!(
                error = %reason,
                preview = %preview,
                "reply validation failed, falling back"
            );
            ValidatedReply {
                value: json!({
                    "answer": content,
                    "citations": [],
                    "meta": {"validation_error": reason}
                }),
                answer: content.to_string(),
                citations: Vec::new(),
                validation_error: Some(reason),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
