//! Retry bookkeeping.
//!
//! Failed items go back to `Pending` while they have attempts left. The
//! attempt counter survives the reset, so the ceiling holds across rounds.

use crate::core::item::{WorkItem, WorkStatus};
use tracing::{debug, warn};

/// Result of one retry pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryOutcome {
    /// Positions reset to `Pending`.
    pub recycled: Vec<usize>,
    /// Positions left `Failed` because they hit the attempt ceiling.
    pub exhausted: Vec<usize>,
}

pub struct RetryCoordinator {
    max_attempts: u32,
}

impl RetryCoordinator {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Reset every retryable failure; report the ones out of attempts.
    ///
    /// Items in any other status are left alone.
    pub fn recycle(&self, items: &mut [WorkItem]) -> RetryOutcome {
        let mut outcome = RetryOutcome::default();
        for (pos, item) in items.iter_mut().enumerate() {
            if item.status != WorkStatus::Failed {
                continue;
            }
            if item.has_attempts_left(self.max_attempts) {
                debug!(item = %item.id, attempts = item.attempts, "recycling failed item");
                item.reset_for_retry();
                outcome.recycled.push(pos);
            } else {
                warn!(item = %item.id, attempts = item.attempts, "retries exhausted");
                outcome.exhausted.push(pos);
            }
        }
        outcome
    }
}
