// SPDX-License-Identifier: MIT OR Apache-2.0
//! Perplexity chat-completions adapter.
//!
//! Perplexity surfaces search citations both at the top level of the reply
//! and inside the message object; both channels are merged behind any
//! citations the JSON body itself carries.

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

const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";

/// Adapter for the Perplexity chat completions API.
pub struct PerplexityAdapter {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    prices: PriceTable,
}

impl PerplexityAdapter {
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
        let provider = config.providers.get("perplexity");
        Self::new(
            provider.map(|p| p.api_key.clone()).unwrap_or_default(),
            provider
                .and_then(|p| p.base_url.clone())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            PriceTable::from_config(config),
        )
    }
}

/// Citations from Perplexity's own channels: the top-level `citations`
/// array and `choices[0].message.citations`.
fn search_citations(data: &Value) -> Vec<String> {
    let mut citations = Vec::new();
    for source in [&data["citations"], &data["choices"][0]["message"]["citations"]] {
        if let Some(items) = source.as_array() {
            citations.extend(items.iter().filter_map(Value::as_str).map(str::to_string));
        }
    }
    citations
}

#[async_trait]
impl ProviderAdapter for PerplexityAdapter {
    fn name(&self) -> &'static str {
        "perplexity"
    }

    fn prepare_prompt(&self, inputs: &PromptInputs) -> ProviderRequest {
        ProviderRequest {
            body: json!({
                "messages": [
                    {"role": "system", "content": system_prompt(&inputs.prompt_version)},
                    {"role": "user", "content": render_user_prompt(inputs)},
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
            "model": settings.model,
            "messages": request.body["messages"],
            "temperature": temperature,
            "top_p": top_p,
            "max_tokens": settings.max_tokens,
            "return_citations": true,
        });

        debug!(
            model = %settings.model,
            temperature,
            allow_sampling = settings.allow_sampling,
            "perplexity request"
        );

        let url = format!("{}/chat/completions", self.base_url);
        let resp = send_with_retry("perplexity", || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedReply(format!("body is not JSON: {e}")))?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ProviderError::MalformedReply("missing choices[0].message.content".into())
            })?;

        let usage: TokenUsage = data
            .get("usage")
            .cloned()
            .and_then(|u| serde_json::from_value(u).ok())
            .unwrap_or_default();

        let reply = validate_reply(content);
        let citations = normalize_citations(&reply.citations, &search_citations(&data));
        let cost_cents = self.compute_cost(&settings.model, &usage);
        let latency_ms = started.elapsed().as_millis() as u64;

        info!(
            model = %settings.model,
            latency_ms,
            total_tokens = usage.total_tokens,
            cost_cents,
            citations = citations.len(),
            "perplexity response"
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
        self.prices.cost_cents("perplexity", model, usage)
    }
}
