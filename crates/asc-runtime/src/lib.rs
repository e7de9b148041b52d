// SPDX-License-Identifier: MIT OR Apache-2.0
//! The run-execution and delivery pipeline.
//!
//! This crate ties the leaf components together: the materializer expands
//! an admitted run into work units, execution workers drive each unit
//! through its state machine (rate gate → provider call → response
//! persist → rollup), the export composer joins results into a flat
//! record stream, and delivery workers POST mapped payloads to partner
//! webhooks under the HTTP-class-aware retry policy.
//!
//! Everything shared is passed in explicitly through [`EngineContext`];
//! teardown order is queues, then workers, then the coordination-store
//! client, then the data store.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod delivery;
pub mod export;
pub mod import;
pub mod materialize;
pub mod rollup;
pub mod worker;

pub use delivery::spawn_delivery_workers;
pub use export::{ExportOutcome, create_export, encode_jsonl, run_export};
pub use import::{ImportItem, ImportOutcome, import_questions};
pub use materialize::{materialize_run, resume_run, start_run};
pub use worker::spawn_execution_workers;

use asc_config::EngineConfig;
use asc_error::ErrorCode;
use asc_mapper::{MapperError, MapperRegistry};
use asc_provider::{ProviderError, ProviderRegistry};
use asc_queue::TaskQueue;
use asc_ratelimit::{RateLimitError, RateLimiter};
use asc_store::{Store, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Rate-limit acquisition deadline for provider calls.
pub const EXEC_ACQUIRE_DEADLINE_SECS: u64 = 60;

/// Rate-limit acquisition deadline for partner deliveries.
pub const DELIVERY_ACQUIRE_DEADLINE_SECS: u64 = 30;

/// Unit attempt budget for the execution worker (distinct from the
/// adapter-internal HTTP attempt budget).
pub const EXEC_MAX_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// One execution-queue message: run one unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecTask {
    /// The run item to execute.
    pub run_item_id: String,
    /// Whether this message is a scheduled retry of a failed unit.
    pub retry: bool,
}

/// One delivery-queue message: attempt one partner POST.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTask {
    /// The delivery to attempt.
    pub delivery_id: String,
}

// ---------------------------------------------------------------------------
// EngineContext
// ---------------------------------------------------------------------------

/// Shared dependencies for all pipeline operations.
///
/// Constructed once at startup and handed to workers and the control
/// surface as an `Arc`.
pub struct EngineContext {
    /// System of record.
    pub store: Arc<dyn Store>,
    /// Enabled provider adapters.
    pub providers: Arc<ProviderRegistry>,
    /// Shared rate limiter (provider and mapper buckets).
    pub limiter: Arc<RateLimiter>,
    /// Registered payload mappers.
    pub mappers: Arc<MapperRegistry>,
    /// Runtime configuration snapshot.
    pub config: EngineConfig,
    /// Execution work queue.
    pub exec_queue: Arc<TaskQueue<ExecTask>>,
    /// Delivery work queue.
    pub delivery_queue: Arc<TaskQueue<DeliveryTask>>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Provider adapter or registry failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Rate-limit acquisition failure.
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    /// Mapper resolution failure.
    #[error(transparent)]
    Mapper(#[from] MapperError),

    /// A run item no longer matches any provider spec of its run.
    #[error("run item '{run_item_id}' matches no provider spec of its run")]
    OrphanedItem {
        /// The orphaned item.
        run_item_id: String,
    },
}

impl RuntimeError {
    /// Stable taxonomy code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Store(StoreError::NotFound { .. }) => ErrorCode::StoreNotFound,
            Self::Store(StoreError::Conflict { .. }) => ErrorCode::StoreConflict,
            Self::Provider(e) => e.code(),
            Self::RateLimit(RateLimitError::Timeout { .. }) => ErrorCode::RateLimitTimeout,
            Self::RateLimit(RateLimitError::Store(_)) => ErrorCode::Internal,
            Self::Mapper(_) => ErrorCode::MapperUnknown,
            Self::OrphanedItem { .. } => ErrorCode::WorkerMissingEntity,
        }
    }

    /// Whether the execution worker should schedule another unit attempt.
    pub fn is_retriable(&self) -> bool {
        self.code().retriability() == asc_error::Retriability::Retriable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_timeout_is_retriable() {
        let err = RuntimeError::RateLimit(RateLimitError::Timeout {
            key: "rate_limit:openai".into(),
            waited_ms: 60_000,
        });
        assert!(err.is_retriable());
        assert_eq!(err.code(), ErrorCode::RateLimitTimeout);
    }

    #[test]
    fn provider_rejection_is_terminal() {
        let err = RuntimeError::Provider(ProviderError::Rejected {
            status: 400,
            body: String::new(),
        });
        assert!(!err.is_retriable());
    }

    #[test]
    fn missing_entities_are_terminal() {
        let err = RuntimeError::Store(StoreError::not_found("run item", "x"));
        assert!(!err.is_retriable());
        let err = RuntimeError::OrphanedItem {
            run_item_id: "x".into(),
        };
        assert!(!err.is_retriable());
    }
}
