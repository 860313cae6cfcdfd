//! The orchestration loop.
//!
//! `Orchestrator` drives a run through a fixed set of phases:
//!
//! ```text
//! Init -> AnalyzeDependencies -> AssignWorkers -> Execute -> Aggregate
//!              ^                      ^                         |
//!              |                      +------- Retry <----------+
//!              +----------------------------------------------+-+-> Done
//! ```
//!
//! Each phase has one handler that returns the next phase. The loop owns
//! the item list for the whole run; only `Execute` runs anything
//! concurrently, and it hands the performer owned copies of item content.

use crate::config::OrchestrationConfig;
use crate::core::graph::DependencyGraph;
use crate::core::item::{ItemId, WorkItem, WorkStatus, WorkerId};
use crate::error::{Error, Result};
use crate::orchestration::aggregator::{ResultAggregator, Signal};
use crate::orchestration::dispatcher::{Assignment, Dispatcher};
use crate::orchestration::executor::ConcurrentExecutor;
use crate::orchestration::performer::{TimeoutPerformer, WorkPerformer};
use crate::orchestration::resolver::DependencyResolver;
use crate::orchestration::retry::RetryCoordinator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

/// Phases of the orchestration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Validate the items and build the dependency graph.
    Init,
    /// Mark pending items with satisfied dependencies as ready.
    AnalyzeDependencies,
    /// Hand ready items to free workers.
    AssignWorkers,
    /// Run the assigned batch concurrently.
    Execute,
    /// Record outcomes, block unreachable items, classify the round.
    Aggregate,
    /// Put retryable failures back in the queue.
    Retry,
    /// Terminal phase.
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::AnalyzeDependencies => "analyze_dependencies",
            Phase::AssignWorkers => "assign_workers",
            Phase::Execute => "execute",
            Phase::Aggregate => "aggregate",
            Phase::Retry => "retry",
            Phase::Done => "done",
        }
    }

    /// Check if the loop may move from this phase to `target`.
    pub fn can_transition(self, target: Phase) -> bool {
        matches!(
            (self, target),
            (Phase::Init, Phase::AnalyzeDependencies)
                | (Phase::AnalyzeDependencies, Phase::AssignWorkers)
                | (Phase::AssignWorkers, Phase::Execute)
                | (Phase::Execute, Phase::Aggregate)
                | (Phase::Aggregate, Phase::AnalyzeDependencies)
                | (Phase::Aggregate, Phase::Retry)
                | (Phase::Aggregate, Phase::Done)
                | (Phase::Retry, Phase::AssignWorkers)
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phase the run entered, with what happened while it was current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub phase: Phase,
    pub entered_at: DateTime<Utc>,
    pub notes: Vec<String>,
}

/// Progress events emitted during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    ItemStarted {
        item_id: ItemId,
        worker: WorkerId,
        attempt: u32,
    },
    ItemCompleted {
        item_id: ItemId,
        result: Value,
    },
    ItemFailed {
        item_id: ItemId,
        error: String,
        attempt: u32,
    },
    /// A dependency can no longer complete.
    ItemBlocked { item_id: ItemId },
    /// The item goes back in the queue for `next_attempt`.
    RetryScheduled { item_id: ItemId, next_attempt: u32 },
    RetryExhausted { item_id: ItemId, attempts: u32 },
    RunComplete {
        completed: usize,
        failed: usize,
        blocked: usize,
    },
}

/// One item currently held by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveExecution {
    pub item_id: ItemId,
    pub content: String,
    pub status: WorkStatus,
    pub worker: WorkerId,
    pub attempt: u32,
    pub started_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of what is running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub active_executions: usize,
    pub items: Vec<ActiveExecution>,
}

/// Final report of a run.
///
/// Item lists keep input order. `exhausted` names the failed items that
/// used every attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub completed: Vec<WorkItem>,
    pub failed: Vec<WorkItem>,
    pub blocked: Vec<WorkItem>,
    pub exhausted: Vec<ItemId>,
    /// Wall-clock time from start to `Done`.
    pub total_duration: Duration,
    /// Number of batches dispatched.
    pub rounds: usize,
    pub trace: Vec<TraceEntry>,
}

impl OrchestrationResult {
    pub fn total_items(&self) -> usize {
        self.completed.len() + self.failed.len() + self.blocked.len()
    }

    /// True when every item completed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }

    /// Sum of the last attempt's duration over every settled item.
    pub fn busy_time(&self) -> Duration {
        self.completed
            .iter()
            .chain(&self.failed)
            .filter_map(WorkItem::duration)
            .filter_map(|d| d.to_std().ok())
            .sum()
    }

    /// Phases in the order they were entered.
    pub fn phases(&self) -> Vec<Phase> {
        self.trace.iter().map(|entry| entry.phase).collect()
    }
}

/// Mutable state of a single run.
struct Run {
    /// Key of this run's entry in the active-execution map.
    id: u64,
    items: Vec<WorkItem>,
    graph: Option<DependencyGraph>,
    dispatcher: Dispatcher,
    batch: Vec<Assignment>,
    phase: Phase,
    rounds: usize,
    exhausted: Vec<usize>,
    trace: Vec<TraceEntry>,
}

impl Run {
    fn new(id: u64, items: Vec<WorkItem>, max_concurrency: usize) -> Self {
        Self {
            id,
            items,
            graph: None,
            dispatcher: Dispatcher::new(max_concurrency),
            batch: Vec::new(),
            phase: Phase::Init,
            rounds: 0,
            exhausted: Vec::new(),
            trace: vec![TraceEntry {
                phase: Phase::Init,
                entered_at: Utc::now(),
                notes: Vec::new(),
            }],
        }
    }

    fn enter(&mut self, target: Phase) -> Result<()> {
        if !self.phase.can_transition(target) {
            return Err(Error::InvalidPhaseTransition {
                from: self.phase.to_string(),
                to: target.to_string(),
            });
        }
        debug!(from = %self.phase, to = %target, "phase transition");
        self.phase = target;
        self.trace.push(TraceEntry {
            phase: target,
            entered_at: Utc::now(),
            notes: Vec::new(),
        });
        Ok(())
    }

    fn note(&mut self, note: impl Into<String>) {
        if let Some(entry) = self.trace.last_mut() {
            entry.notes.push(note.into());
        }
    }
}

/// Runs sets of work items to completion.
///
/// # Example
///
/// ```ignore
/// let orchestrator = Orchestrator::new(Arc::new(my_performer), OrchestrationConfig::default());
/// let result = orchestrator.orchestrate(items).await?;
/// println!("{} completed, {} failed", result.completed.len(), result.failed.len());
/// ```
pub struct Orchestrator {
    executor: ConcurrentExecutor,
    config: OrchestrationConfig,
    event_tx: Option<mpsc::Sender<OrchestratorEvent>>,
    /// In-flight batches, one entry per concurrent run.
    active: Arc<RwLock<BTreeMap<u64, Vec<ActiveExecution>>>>,
    next_run: AtomicU64,
}

impl Orchestrator {
    pub fn new(performer: Arc<dyn WorkPerformer>, config: OrchestrationConfig) -> Self {
        Self {
            executor: ConcurrentExecutor::new(performer),
            config,
            event_tx: None,
            active: Arc::new(RwLock::new(BTreeMap::new())),
            next_run: AtomicU64::new(0),
        }
    }

    /// Build an orchestrator, wrapping the performer in a timeout when the
    /// config sets `item_timeout_ms`.
    pub fn from_config<P>(performer: P, config: OrchestrationConfig) -> Self
    where
        P: WorkPerformer + 'static,
    {
        let performer: Arc<dyn WorkPerformer> = match config.item_timeout() {
            Some(timeout) => Arc::new(TimeoutPerformer::new(performer, timeout)),
            None => Arc::new(performer),
        };
        Self::new(performer, config)
    }

    /// Send progress events to `tx`.
    ///
    /// Events are sent with backpressure: a full channel pauses the run
    /// until the receiver catches up. Drain it while the run is in flight,
    /// or give the channel room for every event.
    ///
    /// ```ignore
    /// let (tx, mut rx) = mpsc::channel(16);
    /// let orchestrator = Orchestrator::new(performer, config).with_events(tx);
    /// let watcher = tokio::spawn(async move {
    ///     while let Some(event) = rx.recv().await {
    ///         println!("{:?}", event);
    ///     }
    /// });
    /// let result = orchestrator.orchestrate(items).await?;
    /// drop(orchestrator);
    /// watcher.await?;
    /// ```
    pub fn with_events(mut self, tx: mpsc::Sender<OrchestratorEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    /// Items held by workers right now, across every run in flight on this
    /// orchestrator. Runs are listed in the order they started.
    pub async fn execution_state(&self) -> ExecutionSnapshot {
        let active = self.active.read().await;
        let items: Vec<ActiveExecution> = active.values().flatten().cloned().collect();
        ExecutionSnapshot {
            active_executions: items.len(),
            items,
        }
    }

    /// Run `items` until nothing more can make progress.
    ///
    /// Per-item failures never surface as errors; they are reported in the
    /// result. Validation problems are returned before any item runs.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` for unusable limits
    /// - `Error::ItemNotFresh` when an item was already scheduled elsewhere
    /// - `Error::DependencyCycle` when the items form a cycle
    /// - `Error::UnknownDependency`, `DuplicateItem`, `SelfDependency`,
    ///   `InvalidPriority` for malformed input
    pub async fn orchestrate(&self, items: Vec<WorkItem>) -> Result<OrchestrationResult> {
        if items.is_empty() {
            debug!("no items to orchestrate");
            return Ok(OrchestrationResult::default());
        }

        let started = Instant::now();
        info!(
            items = items.len(),
            max_concurrency = self.config.max_concurrency,
            max_retries = self.config.max_retries,
            max_attempts = self.config.max_attempts,
            "orchestration started"
        );

        let run_id = self.next_run.fetch_add(1, Ordering::Relaxed);
        let mut run = Run::new(run_id, items, self.config.max_concurrency);
        loop {
            let next = match run.phase {
                Phase::Init => self.init(&mut run)?,
                Phase::AnalyzeDependencies => self.analyze(&mut run),
                Phase::AssignWorkers => self.assign(&mut run).await,
                Phase::Execute => self.execute(&mut run).await,
                Phase::Aggregate => self.aggregate(&mut run).await,
                Phase::Retry => self.retry(&mut run).await,
                Phase::Done => break,
            };
            run.enter(next)?;
        }

        Ok(self.finish(run, started.elapsed()).await)
    }

    fn init(&self, run: &mut Run) -> Result<Phase> {
        self.config.validate()?;
        if let Some(stale) = run.items.iter().find(|it| !it.is_fresh()) {
            return Err(Error::ItemNotFresh {
                item: stale.id.clone(),
                status: stale.status,
                attempts: stale.attempts,
            });
        }
        let graph = DependencyGraph::build(&run.items)?;
        if let Err(e) = graph.ensure_acyclic() {
            error!(error = %e, "orchestration aborted");
            return Err(e);
        }

        run.note(format!(
            "Validated {} items with {} dependencies",
            graph.item_count(),
            graph.dependency_count()
        ));
        run.graph = Some(graph);
        Ok(Phase::AnalyzeDependencies)
    }

    fn analyze(&self, run: &mut Run) -> Phase {
        let completed = DependencyResolver::completed_ids(&run.items);
        let ready = DependencyResolver::resolve(&mut run.items, &completed);
        run.note(format!("{} items ready for execution", ready.len()));
        Phase::AssignWorkers
    }

    async fn assign(&self, run: &mut Run) -> Phase {
        let batch = run.dispatcher.dispatch(&mut run.items);
        if !batch.is_empty() {
            run.rounds += 1;
        }

        let executions: Vec<ActiveExecution> = batch
            .iter()
            .map(|a| {
                let item = &run.items[a.position];
                ActiveExecution {
                    item_id: item.id.clone(),
                    content: item.content.clone(),
                    status: item.status,
                    worker: a.worker,
                    attempt: item.attempts,
                    started_at: item.started_at,
                }
            })
            .collect();
        if !executions.is_empty() {
            self.active.write().await.insert(run.id, executions);
        }

        for a in &batch {
            let item = &run.items[a.position];
            info!(item = %item.id, worker = %a.worker, attempt = item.attempts, "item started");
            self.emit(OrchestratorEvent::ItemStarted {
                item_id: item.id.clone(),
                worker: a.worker,
                attempt: item.attempts,
            })
            .await;
        }

        run.note(format!("Assigned {} items to workers", batch.len()));
        run.batch = batch;
        Phase::Execute
    }

    async fn execute(&self, run: &mut Run) -> Phase {
        let batch = std::mem::take(&mut run.batch);
        let settlements = self.executor.execute_batch(&batch, &run.items).await;
        ConcurrentExecutor::apply(&mut run.items, &settlements);

        let mut succeeded = 0;
        for settlement in &settlements {
            run.dispatcher.release(&settlement.worker);
            let item = &run.items[settlement.position];
            let event = match &settlement.outcome {
                Ok(value) => {
                    succeeded += 1;
                    OrchestratorEvent::ItemCompleted {
                        item_id: item.id.clone(),
                        result: value.clone(),
                    }
                }
                Err(err) => OrchestratorEvent::ItemFailed {
                    item_id: item.id.clone(),
                    error: err.to_string(),
                    attempt: item.attempts,
                },
            };
            self.emit(event).await;
        }
        self.active.write().await.remove(&run.id);

        run.note(format!(
            "Executed {} items: {} succeeded, {} failed",
            settlements.len(),
            succeeded,
            settlements.len() - succeeded
        ));
        Phase::Aggregate
    }

    async fn aggregate(&self, run: &mut Run) -> Phase {
        let blocked = match run.graph.as_ref() {
            Some(graph) => DependencyResolver::block_unsatisfiable(
                &mut run.items,
                graph,
                self.config.max_attempts,
            ),
            None => Vec::new(),
        };
        self.report_blocked(run, &blocked).await;

        let aggregator = ResultAggregator::new(self.config.max_retries, self.config.max_attempts);
        let (tally, signal) = aggregator.classify(&run.items);
        run.note(format!("Aggregation complete: {}", tally));

        match signal {
            Signal::Continue => Phase::AnalyzeDependencies,
            Signal::NeedsRetry => Phase::Retry,
            Signal::Complete => Phase::Done,
        }
    }

    async fn retry(&self, run: &mut Run) -> Phase {
        let outcome = RetryCoordinator::new(self.config.max_attempts).recycle(&mut run.items);

        for &pos in &outcome.exhausted {
            self.report_exhausted(run, pos).await;
        }
        for &pos in &outcome.recycled {
            let item = &run.items[pos];
            self.emit(OrchestratorEvent::RetryScheduled {
                item_id: item.id.clone(),
                next_attempt: item.attempts + 1,
            })
            .await;
        }

        // Recycled items go straight to dispatch, so resolve them here.
        let completed = DependencyResolver::completed_ids(&run.items);
        let ready = DependencyResolver::resolve(&mut run.items, &completed);
        run.note(format!(
            "Retrying {} failed items ({} ready)",
            outcome.recycled.len(),
            ready.len()
        ));
        Phase::AssignWorkers
    }

    async fn finish(&self, mut run: Run, elapsed: Duration) -> OrchestrationResult {
        let blocked = DependencyResolver::block_remaining(&mut run.items);
        self.report_blocked(&mut run, &blocked).await;

        let out_of_attempts: Vec<usize> = run
            .items
            .iter()
            .enumerate()
            .filter(|(_, it)| {
                it.status == WorkStatus::Failed && !it.has_attempts_left(self.config.max_attempts)
            })
            .map(|(pos, _)| pos)
            .collect();
        for pos in out_of_attempts {
            self.report_exhausted(&mut run, pos).await;
        }

        let mut result = OrchestrationResult {
            total_duration: elapsed,
            rounds: run.rounds,
            ..Default::default()
        };
        run.exhausted.sort_unstable();
        result.exhausted = run
            .exhausted
            .iter()
            .map(|&pos| run.items[pos].id.clone())
            .collect();

        for item in run.items {
            match item.status {
                WorkStatus::Completed => result.completed.push(item),
                WorkStatus::Failed => result.failed.push(item),
                _ => result.blocked.push(item),
            }
        }

        let summary = format!(
            "Orchestration complete: {} completed, {} failed, {} blocked in {} rounds",
            result.completed.len(),
            result.failed.len(),
            result.blocked.len(),
            result.rounds
        );
        if let Some(entry) = run.trace.last_mut() {
            entry.notes.push(summary);
        }
        result.trace = run.trace;

        info!(
            completed = result.completed.len(),
            failed = result.failed.len(),
            blocked = result.blocked.len(),
            rounds = result.rounds,
            elapsed_ms = elapsed.as_millis() as u64,
            "orchestration finished"
        );
        self.emit(OrchestratorEvent::RunComplete {
            completed: result.completed.len(),
            failed: result.failed.len(),
            blocked: result.blocked.len(),
        })
        .await;
        result
    }

    async fn report_blocked(&self, run: &mut Run, positions: &[usize]) {
        for &pos in positions {
            let id = run.items[pos].id.clone();
            warn!(item = %id, "item blocked");
            run.note(format!("Blocked {}", id));
            self.emit(OrchestratorEvent::ItemBlocked { item_id: id }).await;
        }
    }

    async fn report_exhausted(&self, run: &mut Run, pos: usize) {
        if run.exhausted.contains(&pos) {
            return;
        }
        run.exhausted.push(pos);

        let item = &run.items[pos];
        let err = Error::RetryExhausted {
            item: item.id.clone(),
            attempts: item.attempts,
        };
        let event = OrchestratorEvent::RetryExhausted {
            item_id: item.id.clone(),
            attempts: item.attempts,
        };
        warn!(error = %err, "giving up on item");
        run.note(err.to_string());
        self.emit(event).await;
    }

    async fn emit(&self, event: OrchestratorEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}
