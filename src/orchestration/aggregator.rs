//! Round classification.
//!
//! After each execution round the aggregator counts item statuses and
//! decides whether the loop should keep going, retry failures, or stop.

use crate::core::item::{WorkItem, WorkStatus};
use crate::orchestration::resolver::DependencyResolver;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What the loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// More items can be dispatched.
    Continue,
    /// Enough failures can still be retried to warrant a retry round.
    NeedsRetry,
    /// Nothing left to dispatch.
    Complete,
}

/// Status counts for one point in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub total: usize,
    pub pending: usize,
    pub ready: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    /// Failed items that still have attempts left.
    pub retryable: usize,
    pub blocked: usize,
}

impl Tally {
    pub fn of(items: &[WorkItem], max_attempts: u32) -> Self {
        let mut tally = Tally {
            total: items.len(),
            ..Default::default()
        };
        for item in items {
            match item.status {
                WorkStatus::Pending => tally.pending += 1,
                WorkStatus::Ready => tally.ready += 1,
                WorkStatus::InProgress => tally.in_progress += 1,
                WorkStatus::Completed => tally.completed += 1,
                WorkStatus::Failed => {
                    tally.failed += 1;
                    if item.has_attempts_left(max_attempts) {
                        tally.retryable += 1;
                    }
                }
                WorkStatus::Blocked => tally.blocked += 1,
            }
        }
        tally
    }

    /// Failed items with no attempts left.
    pub fn exhausted(&self) -> usize {
        self.failed - self.retryable
    }
}

impl std::fmt::Display for Tally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} completed, {} failed, {} pending, {} blocked",
            self.completed,
            self.total,
            self.failed,
            self.pending + self.ready,
            self.blocked
        )
    }
}

pub struct ResultAggregator {
    max_retries: usize,
    max_attempts: u32,
}

impl ResultAggregator {
    pub fn new(max_retries: usize, max_attempts: u32) -> Self {
        Self {
            max_retries,
            max_attempts,
        }
    }

    /// Count statuses and pick the next signal.
    ///
    /// Retry wins when more than `max_retries` failures are retryable.
    /// Otherwise the run continues while any item is ready, or pending
    /// with every dependency completed. Anything else is complete.
    pub fn classify(&self, items: &[WorkItem]) -> (Tally, Signal) {
        let tally = Tally::of(items, self.max_attempts);

        let signal = if tally.retryable > self.max_retries {
            Signal::NeedsRetry
        } else if tally.ready > 0 || Self::has_eligible_pending(items) {
            Signal::Continue
        } else {
            Signal::Complete
        };

        debug!(%tally, ?signal, "round aggregated");
        (tally, signal)
    }

    fn has_eligible_pending(items: &[WorkItem]) -> bool {
        let completed = DependencyResolver::completed_ids(items);
        items.iter().any(|it| {
            it.status == WorkStatus::Pending
                && it.dependencies.iter().all(|dep| completed.contains(dep))
        })
    }
}
