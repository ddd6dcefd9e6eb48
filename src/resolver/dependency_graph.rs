//! Dependency graph over the templates of one Solution.
//!
//! Only *hard* edges enter the graph: dependencies that are not marked circular and
//! that name another template of the same Solution. Circular edges are patched after
//! creation, and ids outside the Solution are soft references to existing items, so
//! neither constrains creation order.
//!
//! The hard subgraph must be acyclic. [`DependencyGraph::detect_cycles`] reports the
//! offending path, and [`CreationSchedule`] hands out items in a valid topological
//! order with ties broken by template order.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap};

use crate::core::{DeployError, ItemTemplate};

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Node has not been visited.
    White,
    /// Node is currently being visited (in the DFS stack).
    Gray,
    /// Node has been fully visited.
    Black,
}

/// Hard-dependency graph of a Solution's templates.
///
/// Node indices follow template order, which is what makes scheduling ties
/// deterministic. An edge `a -> b` means `a` depends on `b`.
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph from a template list.
    ///
    /// # Errors
    ///
    /// [`DeployError::InvalidSolutionData`] when two templates share an `itemId`.
    pub fn from_templates(templates: &[ItemTemplate]) -> Result<Self, DeployError> {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::with_capacity(templates.len());

        for template in templates {
            if node_map.contains_key(&template.item_id) {
                return Err(DeployError::InvalidSolutionData {
                    reason: format!("duplicate template id '{}'", template.item_id),
                });
            }
            let index = graph.add_node(template.item_id.clone());
            node_map.insert(template.item_id.clone(), index);
        }

        let mut dependency_graph = Self {
            graph,
            node_map,
        };
        for template in templates {
            for dependency in template.hard_dependencies() {
                if dependency_graph.node_map.contains_key(dependency) {
                    dependency_graph.add_dependency(&template.item_id, dependency);
                } else {
                    tracing::debug!(
                        "{} references {} outside the solution; not ordering on it",
                        template.item_id,
                        dependency
                    );
                }
            }
        }

        Ok(dependency_graph)
    }

    /// Add a dependency relationship between two existing nodes.
    ///
    /// `from` depends on `to`, meaning `to` must be created before `from`.
    fn add_dependency(&mut self, from: &str, to: &str) {
        let (Some(&from_idx), Some(&to_idx)) = (self.node_map.get(from), self.node_map.get(to))
        else {
            return;
        };

        // Check if edge already exists to avoid duplicates
        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }

    /// Detect cycles in the hard-dependency graph using DFS with colors.
    ///
    /// # Errors
    ///
    /// [`DeployError::DependencyCycle`] naming the cycle, e.g. `a → b → a`.
    pub fn detect_cycles(&self) -> Result<(), DeployError> {
        let mut colors: HashMap<NodeIndex, Color> =
            self.graph.node_indices().map(|node| (node, Color::White)).collect();
        let mut path: Vec<NodeIndex> = Vec::new();

        for node in self.graph.node_indices() {
            if matches!(colors.get(&node), Some(Color::White))
                && let Some(cycle) = self.dfs_visit(node, &mut colors, &mut path)
            {
                let cycle_str = cycle
                    .iter()
                    .map(|idx| self.graph[*idx].as_str())
                    .collect::<Vec<_>>()
                    .join(" → ");
                return Err(DeployError::DependencyCycle {
                    cycle: cycle_str,
                });
            }
        }

        Ok(())
    }

    /// DFS visit for cycle detection.
    ///
    /// Returns `Some(cycle_path)` if a cycle is detected, None otherwise.
    fn dfs_visit(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        for neighbor in self.graph.neighbors(node) {
            match colors.get(&neighbor) {
                Some(Color::Gray) => {
                    let cycle_start = path.iter().position(|n| *n == neighbor).unwrap_or(0);
                    let mut cycle = path[cycle_start..].to_vec();
                    // Repeat the first node so the cycle reads closed
                    cycle.push(neighbor);
                    return Some(cycle);
                }
                Some(Color::White) => {
                    if let Some(cycle) = self.dfs_visit(neighbor, colors, path) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
        None
    }

    /// All items in creation order (dependencies first, ties by template order).
    ///
    /// # Errors
    ///
    /// [`DeployError::DependencyCycle`] if the hard subgraph is cyclic.
    pub fn topological_order(&self) -> Result<Vec<String>, DeployError> {
        Ok(self.creation_waves()?.into_iter().flatten().collect())
    }

    /// Items grouped into waves: every item of a wave depends only on items of
    /// earlier waves.
    pub fn creation_waves(&self) -> Result<Vec<Vec<String>>, DeployError> {
        let mut schedule = CreationSchedule::new(self)?;
        let mut waves = Vec::new();
        while !schedule.is_finished() {
            let wave: Vec<String> = std::iter::from_fn(|| schedule.pop_ready()).collect();
            for id in &wave {
                schedule.complete(id);
            }
            waves.push(wave);
        }
        Ok(waves)
    }

    /// Direct hard dependencies of an item.
    pub fn direct_dependencies(&self, item_id: &str) -> Vec<&str> {
        self.node_map
            .get(item_id)
            .map(|&idx| self.graph.neighbors(idx).map(|n| self.graph[n].as_str()).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Hands out items whose hard dependencies have all completed.
///
/// Ready items are returned lowest template index first. Completing an item may
/// release its dependents. The schedule never yields an item before every one of
/// its hard dependencies has been passed to [`complete`](Self::complete).
pub struct CreationSchedule<'g> {
    graph: &'g DependencyGraph,
    pending: HashMap<NodeIndex, usize>,
    ready: BTreeSet<NodeIndex>,
    remaining: usize,
}

impl<'g> CreationSchedule<'g> {
    /// Start a schedule over a validated graph.
    ///
    /// # Errors
    ///
    /// [`DeployError::DependencyCycle`] if the graph contains a cycle.
    pub fn new(graph: &'g DependencyGraph) -> Result<Self, DeployError> {
        graph.detect_cycles()?;

        let mut pending = HashMap::with_capacity(graph.node_count());
        let mut ready = BTreeSet::new();
        for node in graph.graph.node_indices() {
            let count = graph.graph.neighbors_directed(node, Direction::Outgoing).count();
            if count == 0 {
                ready.insert(node);
            } else {
                pending.insert(node, count);
            }
        }

        Ok(Self {
            graph,
            pending,
            ready,
            remaining: graph.node_count(),
        })
    }

    /// Take the next ready item, if any.
    pub fn pop_ready(&mut self) -> Option<String> {
        let node = self.ready.pop_first()?;
        Some(self.graph.graph[node].clone())
    }

    /// Mark an item as created, releasing dependents whose last dependency it was.
    pub fn complete(&mut self, item_id: &str) {
        let Some(&node) = self.graph.node_map.get(item_id) else {
            return;
        };
        self.remaining = self.remaining.saturating_sub(1);

        for dependent in self.graph.graph.neighbors_directed(node, Direction::Incoming) {
            if let Some(count) = self.pending.get_mut(&dependent) {
                *count -= 1;
                if *count == 0 {
                    self.pending.remove(&dependent);
                    self.ready.insert(dependent);
                }
            }
        }
    }

    /// Whether every item has completed.
    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }
}
