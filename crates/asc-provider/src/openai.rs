// SPDX-License-Identifier: MIT OR Apache-2.0
//! OpenAI chat-completions adapter.

use crate::pricing::PriceTable;
use crate::prompt::{PromptInputs, render_user_prompt, system_prompt};
use crate::retry::send_with_retry;
use crate::validate::validate_reply;
use crate::{
    DETERMINISTIC_SEED, InvokeSettings, PROVIDER_TIMEOUT_SECS, ProviderAdapter, ProviderError,
    ProviderRequest, ProviderResult, normalize_citations,
};
use asc_core::TokenUsage;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Adapter for the OpenAI chat completions API.
pub struct OpenAiAdapter {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    prices: PriceTable,
}

impl OpenAiAdapter {
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
        let provider = config.providers.get("openai");
        Self::new(
            provider.map(|p| p.api_key.clone()).unwrap_or_default(),
            provider
                .and_then(|p| p.base_url.clone())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            PriceTable::from_config(config),
        )
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
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

        let mut body = json!({
            "model": settings.model,
            "messages": request.body["messages"],
            "temperature": temperature,
            "top_p": top_p,
            "max_tokens": settings.max_tokens,
        });
        if !settings.allow_sampling {
            body["seed"] = json!(DETERMINISTIC_SEED);
        }

        debug!(
            model = %settings.model,
            temperature,
            allow_sampling = settings.allow_sampling,
            "openai request"
        );

        let url = format!("{}/chat/completions", self.base_url);
        let resp = send_with_retry("openai", || {
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
        let citations = normalize_citations(&reply.citations, &[]);
        let cost_cents = self.compute_cost(&settings.model, &usage);
        let latency_ms = started.elapsed().as_millis() as u64;

        info!(
            model = %settings.model,
            latency_ms,
            total_tokens = usage.total_tokens,
            cost_cents,
            "openai response"
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
        self.prices.cost_cents("openai", model, usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asc_config::EngineConfig;

    fn adapter() -> OpenAiAdapter {
        OpenAiAdapter::new(
            "sk-test",
            "http://localhost:0",
            PriceTable::from_config(&EngineConfig::default()),
        )
    }

    fn inputs() -> PromptInputs {
        PromptInputs {
            question_text: "How long does the battery last?".into(),
            topic_title: "Battery".into(),
            persona_name: "Reviewer".into(),
            persona_role: "tech reviewer".into(),
            persona_tone: "neutral".into(),
            prompt_version: "v1".into(),
        }
    }

    #[test]
    fn prompt_has_system_then_user_message() {
        let req = adapter().prepare_prompt(&inputs());
        let messages = req.body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert!(
            messages[1]["content"]
                .as_str()
                .unwrap()
                .contains("How long does the battery last?")
        );
        assert_eq!(req.prompt_version, "v1");
    }

    #[test]
    fn cost_uses_openai_table() {
        let cost = adapter().compute_cost("gpt-4o-mini", &TokenUsage::new(100, 50));
        assert!((cost - 4.5).abs() < 1e-9);
    }
}
