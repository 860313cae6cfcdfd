//! Static execution plan.
//!
//! Groups items into phases that could run side by side: every item in
//! phase `n` depends only on items in phases before `n`. Within a phase
//! items follow the priority-aware topological order. The plan is for
//! display and inspection; the orchestrator schedules dynamically.

use crate::core::graph::DependencyGraph;
use crate::core::item::{ItemId, WorkItem};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One item as it appears in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedItem {
    pub id: ItemId,
    pub content: String,
    pub priority: u8,
}

/// A group of items with no dependencies among themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPhase {
    /// 1-based phase number.
    pub phase: usize,
    pub items: Vec<PlannedItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub total_items: usize,
    /// Priority-aware topological order of every item.
    pub order: Vec<ItemId>,
    pub phases: Vec<PlanPhase>,
}

impl ExecutionPlan {
    /// Build the plan for a set of items.
    ///
    /// # Errors
    /// Validation errors from `DependencyGraph::build`, or
    /// `DependencyCycle` when no complete order exists.
    pub fn build(items: &[WorkItem]) -> Result<Self> {
        let graph = DependencyGraph::build(items)?;
        let order = graph.priority_order().into_result()?;

        let position: HashMap<&ItemId, usize> =
            items.iter().enumerate().map(|(i, it)| (&it.id, i)).collect();

        // Depth of an item is one past the deepest dependency. Walking in
        // topological order guarantees dependencies are assigned first.
        let mut depth = vec![0usize; items.len()];
        for id in &order {
            let pos = position[id];
            depth[pos] = graph
                .dependencies_of(pos)
                .into_iter()
                .map(|dep| depth[dep] + 1)
                .max()
                .unwrap_or(0);
        }

        let phase_count = depth.iter().copied().max().map_or(0, |d| d + 1);
        let mut phases: Vec<PlanPhase> = (0..phase_count)
            .map(|i| PlanPhase {
                phase: i + 1,
                items: Vec::new(),
            })
            .collect();

        for id in &order {
            let pos = position[id];
            let item = &items[pos];
            phases[depth[pos]].items.push(PlannedItem {
                id: item.id.clone(),
                content: item.content.clone(),
                priority: item.priority,
            });
        }

        Ok(Self {
            total_items: items.len(),
            order,
            phases,
        })
    }

    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// Widest phase, i.e. the most concurrency the plan can use.
    pub fn max_width(&self) -> usize {
        self.phases.iter().map(|p| p.items.len()).max().unwrap_or(0)
    }
}

impl std::fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.phases.is_empty() {
            return write!(f, "No items");
        }
        writeln!(
            f,
            "Execution plan: {} items in {} phases",
            self.total_items,
            self.phases.len()
        )?;
        for phase in &self.phases {
            writeln!(f, "Phase {}:", phase.phase)?;
            for item in &phase.items {
                writeln!(f, "  [{}] {} - {}", item.priority, item.id, item.content)?;
            }
        }
        Ok(())
    }
}
