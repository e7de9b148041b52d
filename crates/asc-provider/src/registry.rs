// SPDX-License-Identifier: MIT OR Apache-2.0
//! Feature-flag gated provider registry.

use crate::{GeminiAdapter, OpenAiAdapter, PerplexityAdapter, ProviderAdapter, ProviderError};
use asc_config::EngineConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// A typed registry of named [`ProviderAdapter`] implementations.
///
/// Constructed once at startup from feature flags; lookup is
/// case-insensitive. Disabled providers are never constructed, so
/// [`ProviderRegistry::get`] on one fails with a well-defined error that
/// run admission surfaces as a validation failure.
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Build the registry from configuration flags.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut registry = Self::default();
        let enabled = |name: &str| config.providers.get(name).is_some_and(|p| p.enabled);

        if enabled("openai") {
            registry.register(Arc::new(OpenAiAdapter::from_config(config)));
        }
        if enabled("gemini") {
            registry.register(Arc::new(GeminiAdapter::from_config(config)));
        }
        if enabled("perplexity") {
            registry.register(Arc::new(PerplexityAdapter::from_config(config)));
        }

        info!(enabled = ?registry.enabled_providers(), "provider registry initialized");
        registry
    }

    /// Register an adapter under its own name, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    /// Whether `name` resolves to an enabled adapter.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.adapters.contains_key(&name.to_lowercase())
    }

    /// Look up an adapter; disabled and unknown providers fail distinctly.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
        let key = name.to_lowercase();
        if let Some(adapter) = self.adapters.get(&key) {
            return Ok(adapter.clone());
        }
        if matches!(key.as_str(), "openai" | "gemini" | "perplexity") {
            Err(ProviderError::Disabled(key))
        } else {
            Err(ProviderError::Unknown(key))
        }
    }

    /// Sorted list of enabled provider names.
    pub fn enabled_providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
