//! Core domain models for orchestration.
//!
//! This module contains the work item model, the dependency graph built
//! over a run's items, and the static execution plan derived from it.

pub mod graph;
pub mod item;
pub mod plan;

pub use graph::{DependencyGraph, TopologicalOrder};
pub use item::{ItemId, WorkItem, WorkStatus, WorkerId, DEFAULT_PRIORITY, MAX_PRIORITY};
pub use plan::{ExecutionPlan, PlanPhase, PlannedItem};
