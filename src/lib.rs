pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;

pub use config::{Config, OrchestrationConfig};
pub use crate::core::{ExecutionPlan, ItemId, WorkItem, WorkStatus, WorkerId};
pub use error::{Error, PerformError, Result};
pub use orchestration::{
    ExecutionSnapshot, FnPerformer, OrchestrationResult, Orchestrator, OrchestratorEvent,
    WorkPerformer,
};
