//! Dependency resolution.
//!
//! Decides which pending items may run now, and which can never run
//! because something upstream failed for good.

use crate::core::graph::{DependencyGraph, TopologicalOrder};
use crate::core::item::{ItemId, WorkItem, WorkStatus};
use crate::error::Result;
use std::collections::HashSet;
use tracing::debug;

pub struct DependencyResolver;

impl DependencyResolver {
    /// Ids of every item currently `Completed`.
    pub fn completed_ids(items: &[WorkItem]) -> HashSet<ItemId> {
        items
            .iter()
            .filter(|it| it.status == WorkStatus::Completed)
            .map(|it| it.id.clone())
            .collect()
    }

    /// Mark every `Pending` item whose dependencies are all in `completed`
    /// as `Ready`, returning their positions in input order.
    ///
    /// Items with unsatisfied dependencies are left untouched.
    pub fn resolve(items: &mut [WorkItem], completed: &HashSet<ItemId>) -> Vec<usize> {
        let mut ready = Vec::new();
        for (pos, item) in items.iter_mut().enumerate() {
            if item.status != WorkStatus::Pending {
                continue;
            }
            if item.dependencies.iter().all(|dep| completed.contains(dep)) {
                item.mark_ready();
                ready.push(pos);
            }
        }
        debug!(ready = ready.len(), "dependencies analyzed");
        ready
    }

    /// Priority-aware topological order of the items, for static planning.
    ///
    /// # Errors
    /// Validation errors from building the graph. A cycle is not an error
    /// here; it comes back as `TopologicalOrder::CycleDetected`.
    pub fn priority_order(items: &[WorkItem]) -> Result<TopologicalOrder> {
        Ok(DependencyGraph::build(items)?.priority_order())
    }

    /// Block every waiting item downstream of a permanent failure.
    ///
    /// An item fails permanently once it is `Failed` with no attempts left;
    /// `Blocked` items propagate too. Returns the newly blocked positions.
    pub fn block_unsatisfiable(
        items: &mut [WorkItem],
        graph: &DependencyGraph,
        max_attempts: u32,
    ) -> Vec<usize> {
        let sources: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, it)| match it.status {
                WorkStatus::Failed => !it.has_attempts_left(max_attempts),
                WorkStatus::Blocked => true,
                _ => false,
            })
            .map(|(pos, _)| pos)
            .collect();

        let mut blocked = Vec::new();
        for source in sources {
            for pos in graph.transitive_dependents(source) {
                let item = &mut items[pos];
                if matches!(item.status, WorkStatus::Pending | WorkStatus::Ready) {
                    item.block();
                    blocked.push(pos);
                }
            }
        }
        blocked.sort_unstable();
        blocked
    }

    /// Block whatever is still waiting when the run ends.
    pub fn block_remaining(items: &mut [WorkItem]) -> Vec<usize> {
        let mut blocked = Vec::new();
        for (pos, item) in items.iter_mut().enumerate() {
            if matches!(item.status, WorkStatus::Pending | WorkStatus::Ready) {
                item.block();
                blocked.push(pos);
            }
        }
        blocked
    }
}
