// SPDX-License-Identifier: MIT OR Apache-2.0
//! Versioned partner payload mappers.
//!
//! A [`Mapper`] is a pure function from one exported record to the
//! outbound payload a partner expects. Mappers are addressed as
//! `name@version`; changing a payload shape means registering a new
//! version, never mutating an existing one, so partners can pin.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use asc_core::ExportRecord;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

/// Errors from mapper resolution.
#[derive(Debug, thiserror::Error)]
pub enum MapperError {
    /// No mapper with this name is registered.
    #[error("mapper '{0}' not found")]
    UnknownMapper(String),

    /// The name exists but not at this version.
    #[error("mapper '{name}' version '{version}' not found")]
    UnknownVersion {
        /// Mapper name.
        name: String,
        /// Requested version.
        version: String,
    },
}

/// A pure record-to-payload translation.
pub trait Mapper: Send + Sync {
    /// Registry name.
    fn name(&self) -> &'static str;
    /// Registry version tag.
    fn version(&self) -> &'static str;
    /// Translate one exported record into the partner payload.
    fn map(&self, record: &ExportRecord) -> Value;
}

// ---------------------------------------------------------------------------
// ExampleWebhookMapperV1
// ---------------------------------------------------------------------------

/// Reference partner mapper, v1.
pub struct ExampleWebhookMapperV1;

impl Mapper for ExampleWebhookMapperV1 {
    fn name(&self) -> &'static str {
        "example_partner"
    }

    fn version(&self) -> &'static str {
        "v1"
    }

    fn map(&self, record: &ExportRecord) -> Value {
        let response = record.response.as_ref();
        json!({
            "query_id": record.run_item_id,
            "question": record.question_text,
            "answer": response.map(|r| r.answer.as_str()).unwrap_or(""),
            "sources": response.map(|r| r.citations.clone()).unwrap_or_default(),
            "metadata": {
                "provider": response.map(|r| r.provider.as_str()),
                "model": response.map(|r| r.model.as_str()),
                "cost_usd": response.map(|r| r.cost_cents / 100.0).unwrap_or(0.0),
                "latency_ms": response.map(|r| r.latency_ms),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// MapperRegistry
// ---------------------------------------------------------------------------

/// Registry of mappers keyed by `(name, version)`.
pub struct MapperRegistry {
    mappers: HashMap<(String, String), Arc<dyn Mapper>>,
}

impl MapperRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            mappers: HashMap::new(),
        }
    }

    /// The registry with all built-in mappers registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ExampleWebhookMapperV1));
        registry
    }

    /// Register a mapper under its own `(name, version)`.
    pub fn register(&mut self, mapper: Arc<dyn Mapper>) {
        self.mappers.insert(
            (mapper.name().to_string(), mapper.version().to_string()),
            mapper,
        );
    }

    /// Resolve `name@version`.
    pub fn get(&self, name: &str, version: &str) -> Result<Arc<dyn Mapper>, MapperError> {
        if let Some(mapper) = self
            .mappers
            .get(&(name.to_string(), version.to_string()))
        {
            return Ok(mapper.clone());
        }
        if self.mappers.keys().any(|(n, _)| n == name) {
            Err(MapperError::UnknownVersion {
                name: name.to_string(),
                version: version.to_string(),
            })
        } else {
            Err(MapperError::UnknownMapper(name.to_string()))
        }
    }
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
