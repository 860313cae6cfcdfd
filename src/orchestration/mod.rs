//! Orchestration layer.
//!
//! This module runs sets of work items to completion: the resolver decides
//! what may run, the dispatcher hands it to bounded worker slots, the
//! executor runs each batch concurrently, and the aggregator and retry
//! coordinator decide what happens next. `Orchestrator` ties the pieces
//! into one phase-driven loop.

mod aggregator;
mod dispatcher;
mod executor;
mod orchestrator;
mod performer;
mod resolver;
mod retry;

pub use aggregator::{ResultAggregator, Signal, Tally};
pub use dispatcher::{Assignment, Dispatcher};
pub use executor::{ConcurrentExecutor, Settlement};
pub use orchestrator::{
    ActiveExecution, ExecutionSnapshot, OrchestrationResult, Orchestrator, OrchestratorEvent,
    Phase, TraceEntry,
};
pub use performer::{FnPerformer, TimeoutPerformer, WorkPerformer};
pub use resolver::DependencyResolver;
pub use retry::{RetryCoordinator, RetryOutcome};
