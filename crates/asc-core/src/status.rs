// SPDX-License-Identifier: MIT OR Apache-2.0
//! Status enums and their transition rules.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a [`Run`](crate::Run).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No items yet, or all items still waiting.
    Pending,
    /// At least one item is executing or has finished while others remain.
    Running,
    /// Every item reached a terminal state.
    Completed,
    /// The run failed as a whole (admission or materialization error).
    Failed,
    /// The run was cancelled by a user request.
    Cancelled,
}

impl RunStatus {
    /// Returns `true` if this status represents a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Stable string form used in the API and the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ItemStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a [`RunItem`](crate::RunItem).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Materialized but not yet picked up by a worker.
    Pending,
    /// A worker owns the item and is executing the provider call.
    Running,
    /// The provider call completed and a response row exists.
    Succeeded,
    /// The last attempt failed; retriable until the attempt budget is spent.
    Failed,
    /// Dropped at materialization time as a fingerprint duplicate.
    Skipped,
}

impl ItemStatus {
    /// Returns `true` if no further attempt will start from this state
    /// without external intervention (a retry task or a run resume).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Returns the set of statuses that are valid successors of `self`.
    pub fn valid_transitions(&self) -> &'static [ItemStatus] {
        match self {
            Self::Pending => &[Self::Running, Self::Skipped],
            Self::Running => &[Self::Succeeded, Self::Failed],
            // A failed item may be retried (worker countdown or run resume).
            Self::Failed => &[Self::Pending, Self::Running],
            Self::Succeeded | Self::Skipped => &[],
        }
    }

    /// Returns `true` if transitioning from `self` to `next` is valid.
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Stable string form used in the API and the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ExportStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of an [`Export`](crate::Export).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    /// Created, composition not started.
    Pending,
    /// The composer is materializing records.
    Processing,
    /// Records composed (and file written, when a file was requested).
    Completed,
    /// Composition failed.
    Failed,
}

impl ExportStatus {
    /// Stable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// DeliveryStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a [`Delivery`](crate::Delivery).
///
/// A delivery stays `pending` between retries and terminates on the first
/// 2xx (`succeeded`) or the first 4xx / exhausted attempt budget (`failed`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Queued or between retries.
    Pending,
    /// A 2xx partner response was observed.
    Succeeded,
    /// A terminal 4xx was observed or all attempts were spent.
    Failed,
}

impl DeliveryStatus {
    /// Returns `true` if no further attempt will be made.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Stable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RunStatusCounts
// ---------------------------------------------------------------------------

/// Per-status item counts for one run, as computed by the rollup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatusCounts {
    /// Total number of items in the run.
    pub total: usize,
    /// Items in `pending`.
    pub pending: usize,
    /// Items in `running`.
    pub running: usize,
    /// Items in `succeeded`.
    pub succeeded: usize,
    /// Items in `failed`.
    pub failed: usize,
    /// Items in `skipped`.
    pub skipped: usize,
}

impl RunStatusCounts {
    /// Number of items in a terminal state.
    pub fn terminal(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    /// Derive the parent run's status from the item counts.
    ///
    /// The mapping is a pure function of the current counts so that
    /// concurrent rollups converge regardless of write ordering.
    pub fn run_status(&self) -> RunStatus {
        if self.total == 0 {
            RunStatus::Pending
        } else if self.terminal() == self.total {
            RunStatus::Completed
        } else if self.running > 0 || self.succeeded > 0 {
            RunStatus::Running
        } else {
            RunStatus::Pending
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_happy_path_transitions() {
        assert!(ItemStatus::Pending.can_transition_to(ItemStatus::Running));
        assert!(ItemStatus::Running.can_transition_to(ItemStatus::Succeeded));
        assert!(ItemStatus::Running.can_transition_to(ItemStatus::Failed));
    }

    #[test]
    fn item_retry_reenters_running() {
        assert!(ItemStatus::Failed.can_transition_to(ItemStatus::Running));
        assert!(ItemStatus::Failed.can_transition_to(ItemStatus::Pending));
    }

    #[test]
    fn succeeded_and_skipped_are_dead_ends() {
        assert!(ItemStatus::Succeeded.valid_transitions().is_empty());
        assert!(ItemStatus::Skipped.valid_transitions().is_empty());
        assert!(!ItemStatus::Succeeded.can_transition_to(ItemStatus::Running));
    }

    #[test]
    fn reentrant_start_is_rejected() {
        // The queue is single-consumer per message, but the state machine is
        // the safety net for a duplicated task.
        assert!(!ItemStatus::Running.can_transition_to(ItemStatus::Running));
        assert!(!ItemStatus::Pending.can_transition_to(ItemStatus::Succeeded));
    }

    #[test]
    fn empty_run_is_pending() {
        let counts = RunStatusCounts::default();
        assert_eq!(counts.run_status(), RunStatus::Pending);
    }

    #[test]
    fn all_terminal_is_completed() {
        let counts = RunStatusCounts {
            total: 3,
            succeeded: 1,
            failed: 1,
            skipped: 1,
            ..Default::default()
        };
        assert_eq!(counts.run_status(), RunStatus::Completed);
    }

    #[test]
    fn partial_progress_is_running() {
        let counts = RunStatusCounts {
            total: 3,
            pending: 2,
            succeeded: 1,
            ..Default::default()
        };
        assert_eq!(counts.run_status(), RunStatus::Running);

        let counts = RunStatusCounts {
            total: 3,
            pending: 2,
            running: 1,
            ..Default::default()
        };
        assert_eq!(counts.run_status(), RunStatus::Running);
    }

    #[test]
    fn only_pending_and_failed_is_pending() {
        // Failed items are retriable, so a run with nothing in flight and
        // nothing succeeded stays pending until the retries land.
        let counts = RunStatusCounts {
            total: 2,
            pending: 1,
            failed: 1,
            ..Default::default()
        };
        assert_eq!(counts.run_status(), RunStatus::Pending);
    }

    #[test]
    fn status_serde_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&ItemStatus::Succeeded).unwrap(),
            r#""succeeded""#
        );
        assert_eq!(
            serde_json::to_string(&RunStatus::Completed).unwrap(),
            r#""completed""#
        );
        assert_eq!(
            serde_json::to_string(&DeliveryStatus::Pending).unwrap(),
            r#""pending""#
        );
        let back: ItemStatus = serde_json::from_str(r#""skipped""#).unwrap();
        assert_eq!(back, ItemStatus::Skipped);
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(ItemStatus::Failed.to_string(), "failed");
        assert_eq!(RunStatus::Cancelled.to_string(), "cancelled");
        assert_eq!(ExportStatus::Processing.to_string(), "processing");
        assert_eq!(DeliveryStatus::Succeeded.to_string(), "succeeded");
    }
}
