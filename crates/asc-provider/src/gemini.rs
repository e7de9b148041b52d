// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gemini generateContent adapter.
//!
//! Gemini has no separate system turn in this API shape, so the schema
//! instruction and the user prompt are folded into a single `contents`
//! entry. Citations can additionally arrive via grounding metadata, which
//! is merged behind the JSON-body citations.

use crate::pricing::PriceTable;
use crate::prompt::{PromptInputs, render_user_prompt, system_prompt};
use crate::retry::send_with_retry;
use crate::validate::validate_reply;
use crate::{
    InvokeSettings, PROVIDER_TIMEOUT_SECS, ProviderAdapter, ProviderError, ProviderRequest,
    ProviderResult, normalize_citations,
};
use asc_core::TokenUsage;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Adapter for the Gemini generateContent API.
pub struct GeminiAdapter {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    prices: PriceTable,
}

impl GeminiAdapter {
    /// Build the adapter with an explicit base URL (tests, gateways).
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, prices: PriceTable) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .pool_max_idle_per_host(20)
            .build()
            .expect("failed to create HTTP client");
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            prices,
        }
    }

    /// Build the adapter from engine configuration.
    pub fn from_config(config: &asc_config::EngineConfig) -> Self {
        let provider = config.providers.get("gemini");
        Self::new(
            provider.map(|p| p.api_key.clone()).unwrap_or_default(),
            provider
                .and_then(|p| p.base_url.clone())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            PriceTable::from_config(config),
        )
    }
}

/// Pull citation URLs out of Gemini grounding metadata: direct segment
/// URIs plus chunk-indexed web URIs.
fn grounding_citations(data: &Value) -> Vec<String> {
    let mut citations = Vec::new();
    let Some(metadata) = data["candidates"][0].get("groundingMetadata") else {
        return citations;
    };

    let chunks = metadata
        .get("groundingChunks")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for support in metadata
        .get("groundingSupports")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        if let Some(uri) = support["segment"]["uri"].as_str() {
            citations.push(uri.to_string());
        }
        for idx in support
            .get("groundingChunkIndices")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_u64)
        {
            if let Some(chunk) = chunks.get(idx as usize)
                && let Some(uri) = chunk["web"]["uri"].as_str()
            {
                citations.push(uri.to_string());
            }
        }
    }
    citations
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn prepare_prompt(&self, inputs: &PromptInputs) -> ProviderRequest {
        let full_prompt = format!(
            "{}\n\n{}",
            system_prompt(&inputs.prompt_version),
            render_user_prompt(inputs)
        );
        ProviderRequest {
            body: json!({
                "contents": [
                    {"role": "user", "parts": [{"text": full_prompt}]}
                ]
            }),
            prompt_version: inputs.prompt_version.clone(),
        }
    }

    async fn invoke(
        &self,
        request: &ProviderRequest,
        settings: &InvokeSettings,
    ) -> Result<ProviderResult, ProviderError> {
        let started = Instant::now();
        let (temperature, top_p) = settings.sampling_params();

        let body = json!({
            "contents": request.body["contents"],
            "generationConfig": {
                "temperature": temperature,
                "topP": top_p,
                "maxOutputTokens": settings.max_tokens,
            }
        });

        debug!(
            model = %settings.model,
            temperature,
            allow_sampling = settings.allow_sampling,
            "gemini request"
        );

        let url = format!("{}/models/{}:generateContent", self.base_url, settings.model);
        let resp = send_with_retry("gemini", || {
            self.client
                .post(&url)
                .query(&[("key", self.api_key.as_str())])
                .json(&body)
        })
        .await?;

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedReply(format!("body is not JSON: {e}")))?;

        let content = data["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| {
                ProviderError::MalformedReply("missing candidates[0].content.parts[0].text".into())
            })?;

        let usage_metadata = &data["usageMetadata"];
        let usage = TokenUsage {
            prompt_tokens: usage_metadata["promptTokenCount"].as_u64().unwrap_or(0),
            completion_tokens: usage_metadata["candidatesTokenCount"].as_u64().unwrap_or(0),
            total_tokens: usage_metadata["totalTokenCount"].as_u64().unwrap_or(0),
        };

        let reply = validate_reply(content);
        let citations = normalize_citations(&reply.citations, &grounding_citations(&data));
        let cost_cents = self.compute_cost(&settings.model, &usage);
        let latency_ms = started.elapsed().as_millis() as u64;

        info!(
            model = %settings.model,
            latency_ms,
            total_tokens = usage.total_tokens,
            cost_cents,
            citations = citations.len(),
            "gemini response"
        );

        Ok(ProviderResult {
            text: reply.answer,
            citations,
            validated: reply.value,
            usage,
            latency_ms,
            cost_cents,
        })
    }

    fn compute_cost(&self, model: &str, usage: &TokenUsage) -> f64 {
        self.prices.cost_cents("gemini", model, usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_folds_system_and_user_into_one_turn() {
        let adapter = GeminiAdapter::new("k", "http://localhost:0", PriceTable::default());
        let req = adapter.prepare_prompt(&PromptInputs {
            question_text: "Is it waterproof?".into(),
            topic_title: "Durability".into(),
            persona_name: "Buyer".into(),
            persona_role: "consumer".into(),
            persona_tone: "casual".into(),
            prompt_version: "v1".into(),
        });
        let contents = req.body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        let text = contents[0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.contains("valid JSON object"));
        assert!(text.contains("Is it waterproof?"));
    }

    #[test]
    fn grounding_citations_cover_both_channels() {
        let data = json!({
            "candidates": [{
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"uri": "https://chunk.test/0"}},
                        {"web": {"uri": "https://chunk.test/1"}}
                    ],
                    "groundingSupports": [
                        {
                            "segment": {"uri": "https://segment.test/a"},
                            "groundingChunkIndices": [1]
                        },
                        {"groundingChunkIndices": [0]}
                    ]
                }
            }]
        });
        assert_eq!(
            grounding_citations(&data),
            vec![
                "https://segment.test/a",
                "https://chunk.test/1",
                "https://chunk.test/0"
            ]
        );
    }

    #[test]
    fn missing_grounding_metadata_gives_no_citations() {
        assert!(grounding_citations(&json!({"candidates": [{}]})).is_empty());
        assert!(grounding_citations(&json!({})).is_empty());
    }

    #[test]
    fn out_of_range_chunk_indices_are_ignored() {
        let data = json!({
            "candidates": [{
                "groundingMetadata": {
                    "groundingChunks": [],
                    "groundingSupports": [{"groundingChunkIndices": [5]}]
                }
            }]
        });
        assert!(grounding_citations(&data).is_empty());
    }
}
