//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Mock performers that record what ran and how much overlapped
//! - Predefined item sets
//! - Draining orchestrator events

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};

use taskweave::{
    OrchestrationConfig, Orchestrator, OrchestratorEvent, PerformError, WorkItem, WorkPerformer,
};

/// A performer that records every call and tracks peak concurrency.
///
/// Contents listed in `always_fail` fail on every attempt; contents in
/// `fail_first` fail that many times before succeeding.
#[derive(Default)]
pub struct RecordingPerformer {
    delay: Duration,
    always_fail: HashSet<String>,
    fail_first: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<String>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingPerformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn always_failing(mut self, content: &str) -> Self {
        self.always_fail.insert(content.to_string());
        self
    }

    pub fn failing_first(self, content: &str, times: u32) -> Self {
        self.fail_first
            .lock()
            .unwrap()
            .insert(content.to_string(), times);
        self
    }

    /// Contents in the order execution started.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, content: &str) -> usize {
        self.calls().iter().filter(|c| *c == content).count()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkPerformer for RecordingPerformer {
    async fn execute(&self, content: &str) -> Result<Value, PerformError> {
        self.calls.lock().unwrap().push(content.to_string());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.always_fail.contains(content) {
            return Err(PerformError::failed(format!("{} failed", content)));
        }
        {
            let mut remaining = self.fail_first.lock().unwrap();
            if let Some(n) = remaining.get_mut(content) {
                if *n > 0 {
                    *n -= 1;
                    return Err(PerformError::failed(format!("{} flaked", content)));
                }
            }
        }
        Ok(json!({ "output": content }))
    }
}

/// A performer that holds every execution until the gate opens.
pub struct GatedPerformer {
    gate: watch::Receiver<bool>,
}

impl GatedPerformer {
    /// Returns the performer and the sender that opens the gate.
    pub fn new() -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { gate: rx }, tx)
    }
}

#[async_trait]
impl WorkPerformer for GatedPerformer {
    async fn execute(&self, content: &str) -> Result<Value, PerformError> {
        let mut gate = self.gate.clone();
        gate.wait_for(|open| *open)
            .await
            .map_err(|e| PerformError::failed(e.to_string()))?;
        Ok(json!(content))
    }
}

/// Build an orchestrator around a shared performer.
pub fn orchestrator<P: WorkPerformer + 'static>(
    performer: Arc<P>,
    config: OrchestrationConfig,
) -> Orchestrator {
    Orchestrator::new(performer, config)
}

pub fn config(max_concurrency: usize) -> OrchestrationConfig {
    OrchestrationConfig::default().with_max_concurrency(max_concurrency)
}

/// Item whose content equals its id.
pub fn item(id: &str) -> WorkItem {
    WorkItem::new(id, id)
}

/// `n` items with no dependencies: item-0, item-1, ...
pub fn independent_items(n: usize) -> Vec<WorkItem> {
    (0..n).map(|i| item(&format!("item-{}", i))).collect()
}

/// step-0 <- step-1 <- ... <- step-(n-1)
pub fn chain_items(n: usize) -> Vec<WorkItem> {
    (0..n)
        .map(|i| {
            let it = item(&format!("step-{}", i));
            if i == 0 {
                it
            } else {
                it.depends_on(format!("step-{}", i - 1))
            }
        })
        .collect()
}

/// a <- b, a <- c, (b, c) <- d
pub fn diamond_items() -> Vec<WorkItem> {
    vec![
        item("a"),
        item("b").depends_on("a"),
        item("c").depends_on("a"),
        item("d").depends_on("b").depends_on("c"),
    ]
}

pub fn ids(items: &[WorkItem]) -> Vec<&str> {
    items.iter().map(|it| it.id.as_str()).collect()
}

/// Collect every event once all senders are gone.
pub async fn drain(mut rx: mpsc::Receiver<OrchestratorEvent>) -> Vec<OrchestratorEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Collect events on a background task while the run is still going.
pub fn spawn_drain(
    rx: mpsc::Receiver<OrchestratorEvent>,
) -> tokio::task::JoinHandle<Vec<OrchestratorEvent>> {
    tokio::spawn(drain(rx))
}
