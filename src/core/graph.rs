//! Dependency graph over the items of one run.
//!
//! Nodes are items in input order (node `i` is `items[i]`), and an edge
//! `a -> b` means `b` depends on `a`. Building the graph validates ids,
//! references, and priorities; acyclicity is checked separately so the
//! static planner can report cycles as an ordinary outcome.

use crate::core::item::{ItemId, WorkItem, MAX_PRIORITY};
use crate::error::{Error, Result};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Outcome of a priority-aware topological sort.
///
/// A cycle is its own variant so callers can't mistake a partial order
/// for a complete one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologicalOrder {
    /// Every item, each after all of its dependencies.
    Ordered(Vec<ItemId>),
    /// Items that could not be placed, in input order.
    CycleDetected { unplaced: Vec<ItemId> },
}

impl TopologicalOrder {
    pub fn is_ordered(&self) -> bool {
        matches!(self, TopologicalOrder::Ordered(_))
    }

    /// Convert to a `Result`, mapping a cycle to `Error::DependencyCycle`.
    pub fn into_result(self) -> Result<Vec<ItemId>> {
        match self {
            TopologicalOrder::Ordered(ids) => Ok(ids),
            TopologicalOrder::CycleDetected { unplaced } => {
                Err(Error::DependencyCycle { items: unplaced })
            }
        }
    }
}

/// The item dependency graph.
pub struct DependencyGraph {
    graph: DiGraph<ItemId, ()>,
    priorities: Vec<u8>,
    index: HashMap<ItemId, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph for a set of items.
    ///
    /// # Errors
    /// - `DuplicateItem` if two items share an id
    /// - `InvalidPriority` if a priority exceeds `MAX_PRIORITY`
    /// - `SelfDependency` if an item lists itself
    /// - `UnknownDependency` if a dependency id is not in the set
    pub fn build(items: &[WorkItem]) -> Result<Self> {
        let mut graph = DiGraph::with_capacity(items.len(), items.len());
        let mut index = HashMap::with_capacity(items.len());
        let mut priorities = Vec::with_capacity(items.len());

        for item in items {
            if index.contains_key(&item.id) {
                return Err(Error::DuplicateItem(item.id.clone()));
            }
            if item.priority > MAX_PRIORITY {
                return Err(Error::InvalidPriority {
                    item: item.id.clone(),
                    priority: item.priority,
                });
            }
            let node = graph.add_node(item.id.clone());
            index.insert(item.id.clone(), node);
            priorities.push(item.priority);
        }

        for item in items {
            let to = index[&item.id];
            for dep in &item.dependencies {
                if dep == &item.id {
                    return Err(Error::SelfDependency(item.id.clone()));
                }
                let from = index.get(dep).ok_or_else(|| Error::UnknownDependency {
                    item: item.id.clone(),
                    dependency: dep.clone(),
                })?;
                graph.update_edge(*from, to, ());
            }
        }

        Ok(Self {
            graph,
            priorities,
            index,
        })
    }

    /// Get the number of items in the graph.
    pub fn item_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependency edges.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Input position of an item.
    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.index.get(id).map(|n| n.index())
    }

    /// Positions of the items `pos` depends on.
    pub fn dependencies_of(&self, pos: usize) -> Vec<usize> {
        self.neighbors(pos, Direction::Incoming)
    }

    /// Positions of the items that directly depend on `pos`.
    pub fn dependents_of(&self, pos: usize) -> Vec<usize> {
        self.neighbors(pos, Direction::Outgoing)
    }

    fn neighbors(&self, pos: usize, dir: Direction) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(pos), dir)
            .map(|n| n.index())
            .collect();
        out.sort_unstable();
        out
    }

    /// Every item reachable downstream of `pos`, excluding `pos` itself.
    pub fn transitive_dependents(&self, pos: usize) -> Vec<usize> {
        let start = NodeIndex::new(pos);
        let mut bfs = Bfs::new(&self.graph, start);
        let mut out = Vec::new();
        while let Some(node) = bfs.next(&self.graph) {
            if node != start {
                out.push(node.index());
            }
        }
        out.sort_unstable();
        out
    }

    /// Items that sit on a dependency cycle, in input order.
    pub fn cyclic_items(&self) -> Vec<ItemId> {
        let mut positions: Vec<usize> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .flatten()
            .map(|n| n.index())
            .collect();
        positions.sort_unstable();
        positions
            .into_iter()
            .map(|p| self.graph[NodeIndex::new(p)].clone())
            .collect()
    }

    /// Fail with `DependencyCycle` if any cycle exists.
    pub fn ensure_acyclic(&self) -> Result<()> {
        let cyclic = self.cyclic_items();
        if cyclic.is_empty() {
            Ok(())
        } else {
            Err(Error::DependencyCycle { items: cyclic })
        }
    }

    /// Priority-aware topological order.
    ///
    /// Among items whose dependencies are already placed, the highest
    /// priority goes next; ties go to the earlier input position.
    pub fn priority_order(&self) -> TopologicalOrder {
        let mut remaining: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| {
                self.graph
                    .neighbors_directed(n, Direction::Incoming)
                    .count()
            })
            .collect();

        let mut available: BinaryHeap<(u8, Reverse<usize>)> = remaining
            .iter()
            .enumerate()
            .filter(|(_, deps)| **deps == 0)
            .map(|(pos, _)| (self.priorities[pos], Reverse(pos)))
            .collect();

        let mut order = Vec::with_capacity(self.item_count());
        let mut placed = vec![false; self.item_count()];

        while let Some((_, Reverse(pos))) = available.pop() {
            order.push(self.graph[NodeIndex::new(pos)].clone());
            placed[pos] = true;
            for dependent in self
                .graph
                .neighbors_directed(NodeIndex::new(pos), Direction::Outgoing)
            {
                let d = dependent.index();
                remaining[d] -= 1;
                if remaining[d] == 0 {
                    available.push((self.priorities[d], Reverse(d)));
                }
            }
        }

        if order.len() < self.item_count() {
            let unplaced = placed
                .iter()
                .enumerate()
                .filter(|(_, p)| !**p)
                .map(|(pos, _)| self.graph[NodeIndex::new(pos)].clone())
                .collect();
            return TopologicalOrder::CycleDetected { unplaced };
        }

        TopologicalOrder::Ordered(order)
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("items", &self.item_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
