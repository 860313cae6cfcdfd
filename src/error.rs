use std::time::Duration;

use thiserror::Error;

use crate::core::{ItemId, WorkStatus};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dependency cycle detected among: {}", join_ids(.items))]
    DependencyCycle { items: Vec<ItemId> },

    #[error("Item {item} depends on unknown item {dependency}")]
    UnknownDependency { item: ItemId, dependency: ItemId },

    #[error("Duplicate item id: {0}")]
    DuplicateItem(ItemId),

    #[error("Item {0} depends on itself")]
    SelfDependency(ItemId),

    #[error("Item {item} has priority {priority} (max {max})", max = crate::core::MAX_PRIORITY)]
    InvalidPriority { item: ItemId, priority: u8 },

    #[error("Item {item} exhausted its retries after {attempts} attempts")]
    RetryExhausted { item: ItemId, attempts: u32 },

    #[error("Item {item} was already scheduled (status {status}, {attempts} attempts)")]
    ItemNotFresh {
        item: ItemId,
        status: WorkStatus,
        attempts: u32,
    },

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidPhaseTransition { from: String, to: String },
}

fn join_ids(ids: &[ItemId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a work performer for a single item.
///
/// These never abort an orchestration run. The message is stored on the
/// item's `error` field and the item is eligible for retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PerformError {
    #[error("{0}")]
    Failed(String),

    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Worker panicked: {0}")]
    Panicked(String),
}

impl PerformError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}
