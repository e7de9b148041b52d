// SPDX-License-Identifier: MIT OR Apache-2.0
//! Entity records persisted by the store.
//!
//! Identifiers are opaque strings generated on creation. Free-form bodies
//! (persona extras, question metadata, provider replies, mapper payloads)
//! are `serde_json::Value`; everything the pipeline itself reads is a
//! fixed field.

use crate::status::{DeliveryStatus, ExportStatus, ItemStatus, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::record::TokenUsage;

/// Generate a fresh opaque entity id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Catalog entities
// ---------------------------------------------------------------------------

/// A marketing campaign; parent of topics and runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Campaign {
    /// Opaque identifier.
    pub id: String,
    /// Unique campaign name.
    pub name: String,
    /// Marketed product the campaign tracks.
    pub product_name: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A topic inside a campaign; parent of questions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Topic {
    /// Opaque identifier.
    pub id: String,
    /// Owning campaign.
    pub campaign_id: String,
    /// Topic title, unique within the campaign.
    pub title: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// The audience voice a question is asked in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Persona {
    /// Opaque identifier.
    pub id: String,
    /// Unique persona name.
    pub name: String,
    /// Role, e.g. "Reviewer".
    pub role: Option<String>,
    /// Subject-matter domain.
    pub domain: Option<String>,
    /// Locale tag.
    pub locale: Option<String>,
    /// Tone of voice.
    pub tone: Option<String>,
    /// Free-form extras.
    #[serde(default)]
    pub extras: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One question to put to the answer engines.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
    /// Opaque identifier.
    pub id: String,
    /// Owning topic.
    pub topic_id: String,
    /// Persona the question is asked as.
    pub persona_id: String,
    /// Question text.
    pub text: String,
    /// Free-form metadata. Carries `external_id` (uniqueness key within
    /// the topic) and optional `provider_overrides`.
    #[serde(default)]
    pub metadata: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Question {
    /// The import-time uniqueness key inside a topic, if present.
    pub fn external_id(&self) -> Option<&str> {
        self.metadata.get("external_id").and_then(Value::as_str)
    }

    /// Per-question provider setting overrides, empty when absent.
    pub fn provider_overrides(&self) -> Map<String, Value> {
        match self.metadata.get("provider_overrides") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Run spec
// ---------------------------------------------------------------------------

/// One provider entry in a run spec.
///
/// Unknown keys are preserved in `extra` so they participate in the
/// fingerprint and reach the adapter unchanged.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProviderSpec {
    /// Provider name (registry key, case-insensitive at lookup).
    pub name: String,
    /// Model identifier for the provider.
    pub model: String,
    /// Sampling temperature; only honored when `allow_sampling` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling parameter; only honored when `allow_sampling` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Completion token budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Opt-in to caller-supplied sampling parameters.
    #[serde(default)]
    pub allow_sampling: bool,
    /// Any further provider-specific keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProviderSpec {
    /// JSON-object form of the spec, as hashed and as merged with
    /// per-question overrides.
    pub fn as_settings(&self) -> Value {
        serde_json::to_value(self).expect("provider spec serializes")
    }
}

/// Shallow-merge per-question `overrides` on top of a settings object.
/// Override keys win; both inputs are left untouched.
pub fn merge_settings(base: &Value, overrides: &Map<String, Value>) -> Value {
    let mut merged = match base {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    for (k, v) in overrides {
        merged.insert(k.clone(), v.clone());
    }
    Value::Object(merged)
}

/// The admitted run spec: providers to fan out over plus a prompt version.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RunSpec {
    /// Providers to dispatch each question to.
    pub providers: Vec<ProviderSpec>,
    /// Prompt template version.
    #[serde(default = "default_prompt_version")]
    pub prompt_version: String,
}

fn default_prompt_version() -> String {
    "v1".to_string()
}

// ---------------------------------------------------------------------------
// Execution entities
// ---------------------------------------------------------------------------

/// A batch execution of a campaign's questions across providers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    /// Opaque identifier.
    pub id: String,
    /// Owning campaign.
    pub campaign_id: String,
    /// Optional human label.
    pub label: Option<String>,
    /// The full admitted spec.
    pub spec: RunSpec,
    /// Current rollup status.
    pub status: RunStatus,
    /// Sum of response costs, in cents rounded to 4 decimals.
    pub cost_cents: f64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set on the first pending→running item transition.
    pub started_at: Option<DateTime<Utc>>,
    /// Set when every item reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

/// One unit of work: a single provider call on a single question.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunItem {
    /// Opaque identifier.
    pub id: String,
    /// Owning run.
    pub run_id: String,
    /// Question this unit asks.
    pub question_id: String,
    /// Content-addressed key, unique across all items ever created.
    pub fingerprint: String,
    /// Current status.
    pub status: ItemStatus,
    /// Attempts started so far.
    pub attempt_count: u32,
    /// Error text of the most recent failed attempt.
    pub last_error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A validated provider reply for one run item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    /// Opaque identifier.
    pub id: String,
    /// Owning run item.
    pub run_item_id: String,
    /// Provider that produced the reply.
    pub provider: String,
    /// Model used.
    pub model: String,
    /// Prompt template version used.
    pub prompt_version: String,
    /// Verbatim request body sent to the provider.
    pub request: Value,
    /// Validated (or fallback-synthesized) structured reply.
    pub response: Value,
    /// Plain answer text.
    pub text: String,
    /// Ordered, validated, de-duplicated citation URLs.
    pub citations: Vec<String>,
    /// Token usage reported by the provider.
    pub token_usage: TokenUsage,
    /// Wall-clock latency of the final attempt, in milliseconds.
    pub latency_ms: u64,
    /// Cost in cents, rounded to 4 decimals.
    pub cost_cents: f64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Export entities
// ---------------------------------------------------------------------------

/// Output file format requested for an export.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Comma-separated values (encoded by an external collaborator).
    Csv,
    /// Excel workbook (encoded by an external collaborator).
    Xlsx,
    /// JSON Lines.
    Jsonl,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Jsonl => "jsonl",
        };
        f.write_str(s)
    }
}

/// A request to materialize a run's results.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Export {
    /// Opaque identifier.
    pub id: String,
    /// Run being exported.
    pub run_id: String,
    /// Output format.
    pub format: ExportFormat,
    /// Partner mapper, when webhook deliveries were requested.
    pub mapper_name: Option<String>,
    /// Mapper version.
    pub mapper_version: String,
    /// Free-form mapper/webhook configuration (`webhook_url`, `headers`).
    #[serde(default)]
    pub config: Value,
    /// Current status.
    pub status: ExportStatus,
    /// Reference to the produced file, when one was written.
    pub file_ref: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// One outbound POST of a mapped payload to a partner webhook.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Delivery {
    /// Opaque identifier.
    pub id: String,
    /// Owning export.
    pub export_id: String,
    /// Run the payload came from.
    pub run_id: String,
    /// Mapper that produced the payload.
    pub mapper_name: String,
    /// Mapper version.
    pub mapper_version: String,
    /// The mapped payload to POST.
    pub payload: Value,
    /// Current status.
    pub status: DeliveryStatus,
    /// Attempts started so far (HTTP and rate-limit attempts alike).
    pub attempts: u32,
    /// Error text of the most recent failed attempt.
    pub last_error: Option<String>,
    /// Truncated partner response body from the last attempt.
    pub response_body: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provider_spec_roundtrips_with_extra_keys() {
        let raw = json!({
            "name": "openai",
            "model": "gpt-4o-mini",
            "allow_sampling": false,
            "search_depth": "deep"
        });
        let spec: ProviderSpec = serde_json::from_value(raw).unwrap();
        assert_eq!(spec.name, "openai");
        assert_eq!(spec.extra["search_depth"], json!("deep"));

        let back = spec.as_settings();
        assert_eq!(back["search_depth"], json!("deep"));
        assert_eq!(back["model"], json!("gpt-4o-mini"));
    }

    #[test]
    fn provider_spec_defaults() {
        let spec: ProviderSpec =
            serde_json::from_value(json!({"name": "openai", "model": "m"})).unwrap();
        assert!(!spec.allow_sampling);
        assert!(spec.temperature.is_none());
        assert!(spec.top_p.is_none());
        assert!(spec.max_tokens.is_none());
    }

    #[test]
    fn merge_settings_overrides_win() {
        let base = json!({"model": "gpt-4o-mini", "max_tokens": 1000});
        let mut overrides = Map::new();
        overrides.insert("max_tokens".into(), json!(500));
        overrides.insert("region".into(), json!("eu"));

        let merged = merge_settings(&base, &overrides);
        assert_eq!(merged["model"], json!("gpt-4o-mini"));
        assert_eq!(merged["max_tokens"], json!(500));
        assert_eq!(merged["region"], json!("eu"));
    }

    #[test]
    fn merge_settings_empty_overrides_is_identity() {
        let base = json!({"a": 1});
        assert_eq!(merge_settings(&base, &Map::new()), base);
    }

    #[test]
    fn question_metadata_accessors() {
        let q = Question {
            id: new_id(),
            topic_id: new_id(),
            persona_id: new_id(),
            text: "How long does the battery last?".into(),
            metadata: json!({
                "external_id": "Q1",
                "provider_overrides": {"max_tokens": 256}
            }),
            created_at: Utc::now(),
        };
        assert_eq!(q.external_id(), Some("Q1"));
        assert_eq!(q.provider_overrides()["max_tokens"], json!(256));
    }

    #[test]
    fn question_metadata_defaults_are_empty() {
        let q = Question {
            id: new_id(),
            topic_id: new_id(),
            persona_id: new_id(),
            text: "q".into(),
            metadata: Value::Null,
            created_at: Utc::now(),
        };
        assert_eq!(q.external_id(), None);
        assert!(q.provider_overrides().is_empty());
    }

    #[test]
    fn run_spec_default_prompt_version() {
        let spec: RunSpec = serde_json::from_value(json!({
            "providers": [{"name": "openai", "model": "m"}]
        }))
        .unwrap();
        assert_eq!(spec.prompt_version, "v1");
    }

    #[test]
    fn export_format_serde() {
        assert_eq!(serde_json::to_string(&ExportFormat::Jsonl).unwrap(), r#""jsonl""#);
        let f: ExportFormat = serde_json::from_str(r#""csv""#).unwrap();
        assert_eq!(f, ExportFormat::Csv);
        assert_eq!(ExportFormat::Xlsx.to_string(), "xlsx");
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}
