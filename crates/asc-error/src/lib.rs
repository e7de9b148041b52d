//! Unified error taxonomy with stable error codes for answerscope.
//!
//! Every pipeline error carries an [`ErrorCode`] (a machine-readable,
//! stable string tag), a human-readable message, an optional cause chain,
//! and arbitrary key-value context. The code also classifies the error's
//! [`Retriability`], which is what the execution and delivery workers key
//! their retry decisions on.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Admission-time input validation.
    Validation,
    /// Token-bucket acquisition.
    RateLimit,
    /// Provider adapter wire errors.
    Provider,
    /// Execution-worker errors.
    Worker,
    /// Partner delivery errors.
    Delivery,
    /// Store (system of record) errors.
    Store,
    /// Task queue errors.
    Queue,
    /// Mapper resolution errors.
    Mapper,
    /// Configuration errors.
    Config,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::RateLimit => "rate_limit",
            Self::Provider => "provider",
            Self::Worker => "worker",
            Self::Delivery => "delivery",
            Self::Store => "store",
            Self::Queue => "queue",
            Self::Mapper => "mapper",
            Self::Config => "config",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Retriability
// ---------------------------------------------------------------------------

/// Whether an error should be retried by the layer that observed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retriability {
    /// Another attempt may succeed; the caller's backoff policy applies.
    Retriable,
    /// No further attempt will change the outcome.
    Terminal,
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Validation --
    /// Request input failed validation at admission.
    ValidationBadInput,
    /// A run spec referenced a provider that does not exist.
    ValidationUnknownProvider,
    /// A run spec referenced a provider that is disabled by feature flag.
    ValidationProviderDisabled,

    // -- Rate limit --
    /// Token acquisition did not succeed before the deadline.
    RateLimitTimeout,

    // -- Provider --
    /// Provider HTTP call timed out or hit a network fault; the adapter's
    /// attempt budget is already spent when this surfaces.
    ProviderUnreachable,
    /// Provider returned a non-429 4xx.
    ProviderRejected,
    /// Provider returned 5xx on every adapter attempt.
    ProviderUnavailable,
    /// Provider reply was structurally unusable (e.g. no choices).
    ProviderMalformedReply,

    // -- Worker --
    /// A run item was handed to a worker in a state that forbids starting.
    WorkerInvalidTransition,
    /// Referenced entity was gone mid-task.
    WorkerMissingEntity,

    // -- Delivery --
    /// Partner returned 4xx; the delivery is terminally failed.
    DeliveryRejected,
    /// Partner returned 5xx.
    DeliveryUpstreamError,
    /// Partner POST timed out.
    DeliveryTimeout,
    /// Partner POST hit a network fault.
    DeliveryNetworkError,
    /// Per-mapper token acquisition timed out.
    DeliveryRateLimited,
    /// No webhook URL was configured for the delivery.
    DeliveryUnconfigured,

    // -- Store --
    /// Entity not found.
    StoreNotFound,
    /// A uniqueness constraint was violated.
    StoreConflict,

    // -- Queue --
    /// The queue is shut down and accepts no further tasks.
    QueueClosed,

    // -- Mapper --
    /// Mapper name or version is not registered.
    MapperUnknown,

    // -- Config --
    /// Configuration file or value is invalid.
    ConfigInvalid,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationBadInput
            | Self::ValidationUnknownProvider
            | Self::ValidationProviderDisabled => ErrorCategory::Validation,

            Self::RateLimitTimeout => ErrorCategory::RateLimit,

            Self::ProviderUnreachable
            | Self::ProviderRejected
            | Self::ProviderUnavailable
            | Self::ProviderMalformedReply => ErrorCategory::Provider,

            Self::WorkerInvalidTransition | Self::WorkerMissingEntity => ErrorCategory::Worker,

            Self::DeliveryRejected
            | Self::DeliveryUpstreamError
            | Self::DeliveryTimeout
            | Self::DeliveryNetworkError
            | Self::DeliveryRateLimited
            | Self::DeliveryUnconfigured => ErrorCategory::Delivery,

            Self::StoreNotFound | Self::StoreConflict => ErrorCategory::Store,

            Self::QueueClosed => ErrorCategory::Queue,

            Self::MapperUnknown => ErrorCategory::Mapper,

            Self::ConfigInvalid => ErrorCategory::Config,

            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// How the observing layer should treat this error.
    ///
    /// The split follows the routing table of the pipeline design:
    /// rate-limit timeouts and provider/partner 5xx-class faults are
    /// retriable; validation failures, provider/partner 4xx and unknown
    /// mappers are terminal.
    pub fn retriability(&self) -> Retriability {
        match self {
            Self::RateLimitTimeout
            | Self::ProviderUnreachable
            | Self::ProviderUnavailable
            | Self::ProviderMalformedReply
            | Self::DeliveryUpstreamError
            | Self::DeliveryTimeout
            | Self::DeliveryNetworkError
            | Self::DeliveryRateLimited
            | Self::Internal => Retriability::Retriable,

            Self::ValidationBadInput
            | Self::ValidationUnknownProvider
            | Self::ValidationProviderDisabled
            | Self::ProviderRejected
            | Self::WorkerInvalidTransition
            | Self::WorkerMissingEntity
            | Self::DeliveryRejected
            | Self::DeliveryUnconfigured
            | Self::StoreNotFound
            | Self::StoreConflict
            | Self::QueueClosed
            | Self::MapperUnknown
            | Self::ConfigInvalid => Retriability::Terminal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"RATE_LIMIT_TIMEOUT"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationBadInput => "VALIDATION_BAD_INPUT",
            Self::ValidationUnknownProvider => "VALIDATION_UNKNOWN_PROVIDER",
            Self::ValidationProviderDisabled => "VALIDATION_PROVIDER_DISABLED",
            Self::RateLimitTimeout => "RATE_LIMIT_TIMEOUT",
            Self::ProviderUnreachable => "PROVIDER_UNREACHABLE",
            Self::ProviderRejected => "PROVIDER_REJECTED",
            Self::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            Self::ProviderMalformedReply => "PROVIDER_MALFORMED_REPLY",
            Self::WorkerInvalidTransition => "WORKER_INVALID_TRANSITION",
            Self::WorkerMissingEntity => "WORKER_MISSING_ENTITY",
            Self::DeliveryRejected => "DELIVERY_REJECTED",
            Self::DeliveryUpstreamError => "DELIVERY_UPSTREAM_ERROR",
            Self::DeliveryTimeout => "DELIVERY_TIMEOUT",
            Self::DeliveryNetworkError => "DELIVERY_NETWORK_ERROR",
            Self::DeliveryRateLimited => "DELIVERY_RATE_LIMITED",
            Self::DeliveryUnconfigured => "DELIVERY_UNCONFIGURED",
            Self::StoreNotFound => "STORE_NOT_FOUND",
            Self::StoreConflict => "STORE_CONFLICT",
            Self::QueueClosed => "QUEUE_CLOSED",
            Self::MapperUnknown => "MAPPER_UNKNOWN",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Unified pipeline error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use asc_error::{EngineError, ErrorCode};
///
/// let err = EngineError::new(ErrorCode::RateLimitTimeout, "no token within deadline")
///     .with_context("provider", "openai")
///     .with_context("deadline_ms", 60_000);
/// ```
pub struct EngineError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl EngineError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Shorthand for `self.code.retriability()`.
    pub fn retriability(&self) -> Retriability {
        self.code.retriability()
    }

    /// `true` when another attempt is worthwhile.
    pub fn is_retriable(&self) -> bool {
        self.retriability() == Retriability::Retriable
    }
}

impl fmt::Debug for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("EngineError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::ValidationBadInput,
        ErrorCode::ValidationUnknownProvider,
        ErrorCode::ValidationProviderDisabled,
        ErrorCode::RateLimitTimeout,
        ErrorCode::ProviderUnreachable,
        ErrorCode::ProviderRejected,
        ErrorCode::ProviderUnavailable,
        ErrorCode::ProviderMalformedReply,
        ErrorCode::WorkerInvalidTransition,
        ErrorCode::WorkerMissingEntity,
        ErrorCode::DeliveryRejected,
        ErrorCode::DeliveryUpstreamError,
        ErrorCode::DeliveryTimeout,
        ErrorCode::DeliveryNetworkError,
        ErrorCode::DeliveryRateLimited,
        ErrorCode::DeliveryUnconfigured,
        ErrorCode::StoreNotFound,
        ErrorCode::StoreConflict,
        ErrorCode::QueueClosed,
        ErrorCode::MapperUnknown,
        ErrorCode::ConfigInvalid,
        ErrorCode::Internal,
    ];

    #[test]
    fn basic_construction() {
        let err = EngineError::new(ErrorCode::Internal, "boom");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "boom");
        assert!(err.source.is_none());
        assert!(err.context.is_empty());
    }

    #[test]
    fn display_with_context() {
        let err = EngineError::new(ErrorCode::RateLimitTimeout, "no token")
            .with_context("provider", "openai");
        let s = err.to_string();
        assert!(s.starts_with("[RATE_LIMIT_TIMEOUT] no token"));
        assert!(s.contains("provider"));
        assert!(s.contains("openai"));
    }

    #[test]
    fn retry_split_matches_routing_table() {
        // Retriable: rate-limit, provider transport, delivery 5xx-class.
        assert_eq!(
            ErrorCode::RateLimitTimeout.retriability(),
            Retriability::Retriable
        );
        assert_eq!(
            ErrorCode::ProviderUnreachable.retriability(),
            Retriability::Retriable
        );
        assert_eq!(
            ErrorCode::DeliveryUpstreamError.retriability(),
            Retriability::Retriable
        );
        assert_eq!(
            ErrorCode::DeliveryTimeout.retriability(),
            Retriability::Retriable
        );

        // Terminal: 4xx-class and validation.
        assert_eq!(
            ErrorCode::ProviderRejected.retriability(),
            Retriability::Terminal
        );
        assert_eq!(
            ErrorCode::DeliveryRejected.retriability(),
            Retriability::Terminal
        );
        assert_eq!(
            ErrorCode::ValidationProviderDisabled.retriability(),
            Retriability::Terminal
        );
        assert_eq!(ErrorCode::MapperUnknown.retriability(), Retriability::Terminal);
    }

    #[test]
    fn categories_are_consistent() {
        assert_eq!(
            ErrorCode::DeliveryRateLimited.category(),
            ErrorCategory::Delivery
        );
        assert_eq!(ErrorCode::RateLimitTimeout.category(), ErrorCategory::RateLimit);
        assert_eq!(ErrorCode::StoreConflict.category(), ErrorCategory::Store);
        for code in ALL_CODES {
            // Every code's category Display form is non-empty.
            assert!(!code.category().to_string().is_empty());
        }
    }

    #[test]
    fn source_chain_is_preserved() {
        let inner = io::Error::new(io::ErrorKind::TimedOut, "connect timed out");
        let err = EngineError::new(ErrorCode::ProviderUnreachable, "call failed").with_source(inner);
        let src = std::error::Error::source(&err).unwrap();
        assert_eq!(src.to_string(), "connect timed out");
    }

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            let s = code.as_str();
            assert!(seen.insert(s), "duplicate as_str value: {s}");
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn all_codes_serialize_to_as_str() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            let expected = format!(r#""{}""#, code.as_str());
            assert_eq!(json, expected, "mismatch for {code:?}");
        }
    }

    #[test]
    fn is_retriable_shorthand() {
        assert!(EngineError::new(ErrorCode::DeliveryNetworkError, "x").is_retriable());
        assert!(!EngineError::new(ErrorCode::DeliveryRejected, "x").is_retriable());
    }
}
