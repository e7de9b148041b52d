// SPDX-License-Identifier: MIT OR Apache-2.0
//! Static price table and cost computation.

use asc_config::{EngineConfig, ModelPrice};
use asc_core::TokenUsage;
use std::collections::BTreeMap;

/// Round a cent amount to 4 decimal places, half away from zero.
pub fn round_to_4(cents: f64) -> f64 {
    (cents * 10_000.0).round() / 10_000.0
}

/// Immutable `(provider, model)` → price lookup built at startup.
#[derive(Clone, Debug, Default)]
pub struct PriceTable {
    prices: BTreeMap<String, ModelPrice>,
}

impl PriceTable {
    /// Snapshot the configured price table.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            prices: config.pricing.clone(),
        }
    }

    /// Price entry for `(provider, model)`; unknown models cost nothing.
    pub fn price(&self, provider: &str, model: &str) -> ModelPrice {
        self.prices
            .get(&format!("{provider}:{model}"))
            .copied()
            .unwrap_or(ModelPrice {
                input_per_1k: 0.0,
                output_per_1k: 0.0,
            })
    }

    /// Cost of one call in cents:
    /// `((prompt/1000)·in + (completion/1000)·out) · 100`, rounded to
    /// 4 decimals.
    pub fn cost_cents(&self, provider: &str, model: &str, usage: &TokenUsage) -> f64 {
        let price = self.price(provider, model);
        let input_dollars = usage.prompt_tokens as f64 / 1000.0 * price.input_per_1k;
        let output_dollars = usage.completion_tokens as f64 / 1000.0 * price.output_per_1k;
        round_to_4((input_dollars + output_dollars) * 100.0)
    }
}
