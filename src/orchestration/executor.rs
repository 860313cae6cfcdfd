//! Concurrent batch execution.
//!
//! Every assignment in a batch runs as its own tokio task. The executor
//! waits for the whole batch, then the caller folds the settlements back
//! into the item list. Items are never touched while tasks are running.

use crate::core::item::{WorkItem, WorkerId};
use crate::error::PerformError;
use crate::orchestration::dispatcher::Assignment;
use crate::orchestration::performer::WorkPerformer;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, warn};

/// The outcome of one assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub position: usize,
    pub worker: WorkerId,
    pub outcome: Result<Value, PerformError>,
}

impl Settlement {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

pub struct ConcurrentExecutor {
    performer: Arc<dyn WorkPerformer>,
}

impl ConcurrentExecutor {
    pub fn new(performer: Arc<dyn WorkPerformer>) -> Self {
        Self { performer }
    }

    /// Run every assignment concurrently and wait for all of them.
    ///
    /// Settlements come back in batch order. A performer that panics
    /// settles as `PerformError::Panicked`; the rest of the batch is
    /// unaffected.
    pub async fn execute_batch(
        &self,
        batch: &[Assignment],
        items: &[WorkItem],
    ) -> Vec<Settlement> {
        if batch.is_empty() {
            return Vec::new();
        }

        let handles: Vec<_> = batch
            .iter()
            .map(|assignment| {
                let performer = Arc::clone(&self.performer);
                let content = items[assignment.position].content.clone();
                tokio::spawn(async move { performer.execute(&content).await })
            })
            .collect();

        debug!(tasks = handles.len(), "batch spawned");
        let joined = join_all(handles).await;

        batch
            .iter()
            .zip(joined)
            .map(|(assignment, joined)| Settlement {
                position: assignment.position,
                worker: assignment.worker,
                outcome: joined.unwrap_or_else(|e| Err(PerformError::Panicked(panic_message(e)))),
            })
            .collect()
    }

    /// Record settlements on their items.
    ///
    /// Successes store the performer's value; failures store the error
    /// message. Either way the worker is released from the item.
    pub fn apply(items: &mut [WorkItem], settlements: &[Settlement]) {
        for settlement in settlements {
            let item = &mut items[settlement.position];
            match &settlement.outcome {
                Ok(value) => {
                    debug!(item = %item.id, attempt = item.attempts, "item completed");
                    item.complete(value.clone());
                }
                Err(err) => {
                    warn!(item = %item.id, attempt = item.attempts, error = %err, "item failed");
                    item.fail(&err.to_string());
                }
            }
        }
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(msg) = payload.downcast_ref::<&str>() {
                msg.to_string()
            } else if let Some(msg) = payload.downcast_ref::<String>() {
                msg.clone()
            } else {
                "unknown panic".to_string()
            }
        }
        Err(err) => err.to_string(),
    }
}
