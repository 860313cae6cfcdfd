//! Worker slot allocation.
//!
//! The `Dispatcher` hands ready items to logical workers, never holding
//! more than `max_concurrency` assignments at once. Workers are plain
//! tokens; the actual execution happens in the executor.

use crate::core::item::{ItemId, WorkItem, WorkStatus, WorkerId};
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::debug;

/// An item handed to a worker for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// The worker token issued for this attempt.
    pub worker: WorkerId,
    /// Position of the item in the run's item list.
    pub position: usize,
    /// Id of the assigned item.
    pub item: ItemId,
}

/// Bounded pool of worker slots.
///
/// # Example
///
/// ```ignore
/// let mut dispatcher = Dispatcher::new(2);
/// let batch = dispatcher.dispatch(&mut items);
/// assert!(batch.len() <= 2);
/// ```
#[derive(Debug)]
pub struct Dispatcher {
    /// Maximum number of simultaneous assignments.
    max_concurrency: usize,
    /// Live assignments: worker -> item position.
    active: HashMap<WorkerId, usize>,
}

impl Dispatcher {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            active: HashMap::new(),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Number of workers currently holding an item.
    pub fn busy(&self) -> usize {
        self.active.len()
    }

    pub fn free_slots(&self) -> usize {
        self.max_concurrency.saturating_sub(self.active.len())
    }

    pub fn has_capacity(&self) -> bool {
        self.free_slots() > 0
    }

    /// Position of the item a worker is holding.
    pub fn position_of(&self, worker: &WorkerId) -> Option<usize> {
        self.active.get(worker).copied()
    }

    /// Pick up to `free_slots` ready, unassigned items.
    ///
    /// Highest priority first; equal priorities keep input order.
    pub fn select(items: &[WorkItem], free_slots: usize) -> Vec<usize> {
        let mut candidates: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, it)| it.status == WorkStatus::Ready && it.assigned_worker.is_none())
            .map(|(pos, _)| pos)
            .collect();
        // Stable sort keeps input order within a priority.
        candidates.sort_by_key(|&pos| Reverse(items[pos].priority));
        candidates.truncate(free_slots);
        candidates
    }

    /// Assign fresh workers to as many ready items as there are free slots.
    ///
    /// Each assigned item becomes `InProgress` with a new worker token and
    /// one more attempt on its counter. Items beyond the budget stay ready.
    pub fn dispatch(&mut self, items: &mut [WorkItem]) -> Vec<Assignment> {
        let selected = Self::select(items, self.free_slots());
        let mut batch = Vec::with_capacity(selected.len());

        for pos in selected {
            let worker = WorkerId::new();
            let item = &mut items[pos];
            item.start(worker);
            self.active.insert(worker, pos);
            batch.push(Assignment {
                worker,
                position: pos,
                item: item.id.clone(),
            });
        }

        debug!(
            dispatched = batch.len(),
            busy = self.busy(),
            max = self.max_concurrency,
            "workers assigned"
        );
        batch
    }

    /// Free a worker's slot, returning the item position it held.
    pub fn release(&mut self, worker: &WorkerId) -> Option<usize> {
        self.active.remove(worker)
    }
}
