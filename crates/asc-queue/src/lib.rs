// SPDX-License-Identifier: MIT OR Apache-2.0
//! FIFO task queue for the execution and delivery worker pools.
//!
//! Tasks are delivered in enqueue order; [`TaskQueue::push_after`] parks a
//! task until its countdown elapses (retry backoff), after which it joins
//! the ready queue in availability order. Consumers block on
//! [`TaskQueue::pop`], which wakes promptly on new work, on the next
//! countdown expiry, and on shutdown.
//!
//! There is deliberately no priority lane: units of the same run are
//! independent and processed strictly in arrival order.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// ShutdownToken
// ---------------------------------------------------------------------------

/// A cloneable, cheaply-shareable token used to signal worker shutdown.
///
/// All clones share the same underlying state; triggering one immediately
/// makes every clone observe `is_shutdown() == true` and wakes all waiters.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    /// Create a token that is **not** triggered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal shutdown. Idempotent.
    pub fn trigger(&self) {
        self.inner.triggered.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns `true` once [`trigger`](Self::trigger) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Completes when the token is triggered; immediately if it already is.
    pub async fn triggered(&self) {
        loop {
            if self.is_shutdown() {
                return;
            }
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before the re-check so a trigger racing this call
            // cannot be lost between check and await.
            notified.as_mut().enable();
            if self.is_shutdown() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for ShutdownToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownToken")
            .field("triggered", &self.is_shutdown())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TaskQueue
// ---------------------------------------------------------------------------

/// Snapshot statistics for a [`TaskQueue`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct QueueStats {
    /// Tasks ready for immediate pop.
    pub ready: usize,
    /// Tasks parked behind a countdown.
    pub delayed: usize,
}

struct Delayed<T> {
    available_at: Instant,
    seq: u64,
    task: T,
}

struct Inner<T> {
    ready: VecDeque<T>,
    delayed: Vec<Delayed<T>>,
    next_seq: u64,
}

/// An in-process FIFO queue with countdown-delayed entries.
pub struct TaskQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ready: VecDeque::new(),
                delayed: Vec::new(),
                next_seq: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue a task for immediate delivery.
    pub fn push(&self, task: T) {
        {
            let mut inner = self.inner.lock().expect("queue lock poisoned");
            inner.ready.push_back(task);
        }
        self.notify.notify_waiters();
    }

    /// Enqueue a task that becomes deliverable after `delay`.
    pub fn push_after(&self, task: T, delay: Duration) {
        {
            let mut inner = self.inner.lock().expect("queue lock poisoned");
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.delayed.push(Delayed {
                available_at: Instant::now() + delay,
                seq,
                task,
            });
        }
        self.notify.notify_waiters();
    }

    /// Move due delayed tasks into the ready queue, preserving availability
    /// order (ties broken by enqueue order). Returns the next wake-up time
    /// if delayed tasks remain.
    fn promote_due(inner: &mut Inner<T>) -> Option<Instant> {
        let now = Instant::now();
        let mut due: Vec<Delayed<T>> = Vec::new();
        let mut i = 0;
        while i < inner.delayed.len() {
            if inner.delayed[i].available_at <= now {
                due.push(inner.delayed.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|d| (d.available_at, d.seq));
        for d in due {
            inner.ready.push_back(d.task);
        }
        inner.delayed.iter().map(|d| d.available_at).min()
    }

    /// Pop one task without blocking.
    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        Self::promote_due(&mut inner);
        inner.ready.pop_front()
    }

    /// Pop the next task, waiting for one to become available.
    ///
    /// Returns `None` once `shutdown` triggers; tasks already handed out
    /// keep running, anything still queued stays queued.
    pub async fn pop(&self, shutdown: &ShutdownToken) -> Option<T> {
        loop {
            if shutdown.is_shutdown() {
                return None;
            }

            // Register for wake-ups before inspecting the queue, so a push
            // landing between the check and the await is never lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_due = {
                let mut inner = self.inner.lock().expect("queue lock poisoned");
                let next_due = Self::promote_due(&mut inner);
                if let Some(task) = inner.ready.pop_front() {
                    return Some(task);
                }
                next_due
            };

            match next_due {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                        _ = shutdown.triggered() => return None,
                    }
                }
                None => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = shutdown.triggered() => return None,
                    }
                }
            }
        }
    }

    /// Number of tasks currently queued (ready + delayed).
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("queue lock poisoned");
        inner.ready.len() + inner.delayed.len()
    }

    /// Whether the queue holds no tasks at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of queue statistics.
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().expect("queue lock poisoned");
        QueueStats {
            ready: inner.ready.len(),
            delayed: inner.delayed.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
