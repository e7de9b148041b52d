// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared token-bucket rate limiting over a coordination store.
//!
//! Every provider (and every delivery mapper) gets one bucket keyed by
//! name. Bucket state lives in a process-external [`CoordinationStore`] so
//! that independent workers share capacity; each read-modify-write is a
//! versioned compare-and-swap, so contention between workers for the same
//! bucket can never over-issue tokens.
//!
//! [`TokenBucket::acquire`] blocks (sleeping at most 100 ms between tries)
//! until a token is granted or the deadline passes. Cancellation is honored
//! by dropping the future; there is no held state to release.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Maximum sleep between acquisition attempts.
const RETRY_SLEEP: Duration = Duration::from_millis(100);

/// Idle time after which a bucket may be dropped from the store. GC only —
/// a recreated bucket starts full, which callers must not rely on.
const BUCKET_IDLE_TTL: Duration = Duration::from_secs(60);

/// Milliseconds since the first call into this module, on the tokio clock
/// so paused-time tests observe refill deterministically.
fn now_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    let start = *START.get_or_init(Instant::now);
    Instant::now().duration_since(start).as_millis() as u64
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the coordination store itself.
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// The store is unreachable or rejected the operation.
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by [`TokenBucket::acquire`].
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// No token could be granted before the deadline.
    #[error("rate limit timeout for '{key}' after {waited_ms} ms")]
    Timeout {
        /// Bucket key that timed out.
        key: String,
        /// Total time spent waiting.
        waited_ms: u64,
    },

    /// The coordination store failed.
    #[error(transparent)]
    Store(#[from] CoordinationError),
}

// ---------------------------------------------------------------------------
// CoordinationStore
// ---------------------------------------------------------------------------

/// Persistent state of one token bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    /// Tokens currently available.
    pub tokens: f64,
    /// Timestamp (module clock, ms) of the last refill accounting.
    pub last_update_ms: u64,
}

/// Shared key/value service holding rate-limit buckets.
///
/// Mutation is modeled as a versioned compare-and-swap per key: callers
/// load `(version, state)`, compute the successor state, and store it with
/// the version they observed. A concurrent writer invalidates the version
/// and the caller re-reads. This is the portable equivalent of an
/// atomically-scripted update on the backing store.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Load the current `(version, state)` of a bucket, `None` if absent.
    async fn load(&self, key: &str) -> Result<Option<(u64, BucketState)>, CoordinationError>;

    /// Store `state` iff the bucket's version still matches `expected`
    /// (`None` means "insert only if absent"). Returns `false` on a lost
    /// race, in which case the caller must re-read.
    async fn compare_and_store(
        &self,
        key: &str,
        expected: Option<u64>,
        state: BucketState,
    ) -> Result<bool, CoordinationError>;
}

// ---------------------------------------------------------------------------
// MemoryCoordination
// ---------------------------------------------------------------------------

struct MemoryEntry {
    version: u64,
    state: BucketState,
    touched_ms: u64,
}

/// In-process [`CoordinationStore`].
///
/// The shipped implementation for single-node deployments and tests; the
/// trait seam is what a networked store plugs into.
#[derive(Default)]
pub struct MemoryCoordination {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryCoordination {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordination {
    async fn load(&self, key: &str) -> Result<Option<(u64, BucketState)>, CoordinationError> {
        let mut entries = self.entries.lock().expect("coordination lock poisoned");
        let now = now_ms();
        let expired = entries
            .get(key)
            .is_some_and(|e| now.saturating_sub(e.touched_ms) > BUCKET_IDLE_TTL.as_millis() as u64);
        if expired {
            entries.remove(key);
        }
        Ok(entries.get(key).map(|e| (e.version, e.state)))
    }

    async fn compare_and_store(
        &self,
        key: &str,
        expected: Option<u64>,
        state: BucketState,
    ) -> Result<bool, CoordinationError> {
        let mut entries = self.entries.lock().expect("coordination lock poisoned");
        let now = now_ms();
        match expected {
            Some(version) => {
                if let Some(entry) = entries.get_mut(key)
                    && entry.version == version
                {
                    entry.version += 1;
                    entry.state = state;
                    entry.touched_ms = now;
                    return Ok(true);
                }
                Ok(false)
            }
            None => {
                if entries.contains_key(key) {
                    return Ok(false);
                }
                entries.insert(
                    key.to_string(),
                    MemoryEntry {
                        version: 1,
                        state,
                        touched_ms: now,
                    },
                );
                Ok(true)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TokenBucket
// ---------------------------------------------------------------------------

/// A single named token bucket.
pub struct TokenBucket {
    store: Arc<dyn CoordinationStore>,
    key: String,
    qps: u32,
    burst: u32,
}

impl TokenBucket {
    /// Create a bucket handle. `qps` is the refill rate in tokens/second,
    /// `burst` the bucket capacity; both must be non-zero.
    pub fn new(store: Arc<dyn CoordinationStore>, key: impl Into<String>, qps: u32, burst: u32) -> Self {
        Self {
            store,
            key: format!("rate_limit:{}", key.into()),
            qps: qps.max(1),
            burst: burst.max(1),
        }
    }

    fn refill_interval_ms(&self) -> f64 {
        1000.0 / f64::from(self.qps)
    }

    /// Acquire `n` tokens, blocking until granted or `deadline` elapses.
    pub async fn acquire(&self, n: u32, deadline: Duration) -> Result<(), RateLimitError> {
        let started = Instant::now();
        loop {
            if self.try_acquire(n).await? {
                return Ok(());
            }
            let waited = started.elapsed();
            if waited >= deadline {
                warn!(key = %self.key, waited_ms = waited.as_millis() as u64, "rate limit timeout");
                return Err(RateLimitError::Timeout {
                    key: self.key.clone(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
            let remaining = deadline - waited;
            tokio::time::sleep(remaining.min(RETRY_SLEEP)).await;
        }
    }

    /// One non-blocking attempt: refill by elapsed whole intervals, then
    /// consume if possible. The refreshed state is persisted even when the
    /// grant is denied.
    pub async fn try_acquire(&self, n: u32) -> Result<bool, RateLimitError> {
        loop {
            let now = now_ms();
            let loaded = self.store.load(&self.key).await?;
            let (expected, prior) = match loaded {
                Some((version, state)) => (Some(version), state),
                None => (
                    None,
                    BucketState {
                        tokens: f64::from(self.burst),
                        last_update_ms: now,
                    },
                ),
            };

            let interval = self.refill_interval_ms();
            let elapsed = now.saturating_sub(prior.last_update_ms) as f64;
            let refill = (elapsed / interval).floor();
            let mut state = BucketState {
                tokens: (prior.tokens + refill).min(f64::from(self.burst)),
                // Keep the fractional-interval remainder so slow drips of
                // time still add up to whole tokens.
                last_update_ms: now - (elapsed - refill * interval) as u64,
            };

            let granted = state.tokens >= f64::from(n);
            if granted {
                state.tokens -= f64::from(n);
            }

            if self.store.compare_and_store(&self.key, expected, state).await? {
                if !granted {
                    debug!(key = %self.key, requested = n, "rate limit throttled");
                }
                return Ok(granted);
            }
            // Lost the CAS race to another worker; re-read and recompute.
        }
    }
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

/// Bucket registry shared by all workers of one process.
pub struct RateLimiter {
    store: Arc<dyn CoordinationStore>,
    buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
}

impl RateLimiter {
    /// Create a limiter over the given coordination store.
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the bucket for `name` with the given limits.
    pub fn bucket(&self, name: &str, qps: u32, burst: u32) -> Arc<TokenBucket> {
        let mut buckets = self.buckets.lock().expect("bucket lock poisoned");
        buckets
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(self.store.clone(), name, qps, burst)))
            .clone()
    }

    /// Acquire one token for `name`, creating the bucket on first use.
    pub async fn acquire(
        &self,
        name: &str,
        qps: u32,
        burst: u32,
        deadline: Duration,
    ) -> Result<(), RateLimitError> {
        self.bucket(name, qps, burst).acquire(1, deadline).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
