//! Work item data model.
//!
//! Items are the atomic units of work handed to a performer. Each item
//! tracks its status, worker assignment, attempts, timing, and outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Highest priority an item may carry.
pub const MAX_PRIORITY: u8 = 10;

/// Priority assigned when the caller does not pick one.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Unique identifier for an item within a run.
///
/// Callers usually name items themselves; `generate` hands out a UUID v4
/// string for those that don't.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::generate()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Logical worker token issued for a single dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.short())
    }
}

/// Item status in its lifecycle.
///
/// Pending -> Ready -> InProgress -> Completed | Failed. Failed items may
/// go back to Pending while attempts remain. Blocked is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    /// Created, dependencies not yet known to be satisfied.
    #[default]
    Pending,
    /// Dependencies satisfied, waiting for a worker slot.
    Ready,
    /// Assigned to a worker and executing.
    InProgress,
    /// Finished successfully. Never changes again within a run.
    Completed,
    /// Last attempt failed.
    Failed,
    /// A dependency can no longer succeed.
    Blocked,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Pending => "pending",
            WorkStatus::Ready => "ready",
            WorkStatus::InProgress => "in_progress",
            WorkStatus::Completed => "completed",
            WorkStatus::Failed => "failed",
            WorkStatus::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single unit of schedulable work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ItemId,
    /// Opaque payload handed to the performer.
    pub content: String,
    #[serde(default)]
    pub status: WorkStatus,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub dependencies: Vec<ItemId>,
    #[serde(default)]
    pub assigned_worker: Option<WorkerId>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    /// How many times this item has been dispatched.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

impl WorkItem {
    /// Create a new pending item with default priority and no dependencies.
    pub fn new(id: impl Into<ItemId>, content: &str) -> Self {
        Self {
            id: id.into(),
            content: content.to_string(),
            status: WorkStatus::Pending,
            priority: DEFAULT_PRIORITY,
            dependencies: Vec::new(),
            assigned_worker: None,
            result: None,
            error: None,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Add a dependency. Adding the same id twice keeps one entry.
    pub fn depends_on(mut self, id: impl Into<ItemId>) -> Self {
        let id = id.into();
        if !self.dependencies.contains(&id) {
            self.dependencies.push(id);
        }
        self
    }

    /// Mark dependencies as satisfied.
    pub fn mark_ready(&mut self) {
        self.status = WorkStatus::Ready;
    }

    /// Hand the item to a worker: InProgress, started now, one more attempt.
    pub fn start(&mut self, worker: WorkerId) {
        self.status = WorkStatus::InProgress;
        self.assigned_worker = Some(worker);
        self.attempts += 1;
        self.started_at = Some(Utc::now());
    }

    /// Record a successful outcome and release the worker.
    pub fn complete(&mut self, result: Value) {
        self.status = WorkStatus::Completed;
        self.result = Some(result);
        self.error = None;
        self.assigned_worker = None;
        self.completed_at = Some(Utc::now());
    }

    /// Record a failed outcome and release the worker.
    pub fn fail(&mut self, error: &str) {
        self.status = WorkStatus::Failed;
        self.error = Some(error.to_string());
        self.result = None;
        self.assigned_worker = None;
        self.completed_at = Some(Utc::now());
    }

    pub fn block(&mut self) {
        self.status = WorkStatus::Blocked;
        self.assigned_worker = None;
    }

    /// Put a failed item back in the queue for another attempt.
    ///
    /// Dependencies, priority, and the attempt counter are kept.
    pub fn reset_for_retry(&mut self) {
        self.status = WorkStatus::Pending;
        self.error = None;
        self.result = None;
        self.assigned_worker = None;
        self.completed_at = None;
    }

    /// Check if the item has never been touched by a run.
    pub fn is_fresh(&self) -> bool {
        self.status == WorkStatus::Pending
            && self.attempts == 0
            && self.assigned_worker.is_none()
            && self.started_at.is_none()
    }

    /// Check if the item reached a state it will not leave on its own.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            WorkStatus::Completed | WorkStatus::Failed | WorkStatus::Blocked
        )
    }

    pub fn has_attempts_left(&self, max_attempts: u32) -> bool {
        self.attempts < max_attempts
    }

    /// Wall time of the last attempt, if it settled.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// One-line rendering: `[priority] id: content (status)`.
    pub fn summary(&self) -> String {
        format!(
            "[{}] {}: {} ({})",
            self.priority, self.id, self.content, self.status
        )
    }
}
