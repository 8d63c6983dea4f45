//! Execution DAG over the specs of one run.
//!
//! Provides parallel execution waves (groups of specs whose dependencies all
//! sit in earlier waves) plus dependency queries in both directions. Edges
//! come from `depends_on` inside the run and from references satisfied by a
//! base spec of the same run.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::catalog::ResourceSpec;
use crate::scope::{ResolveError, cycle_members, ordering_graph};

pub struct ExecutionDag {
  /// Node weights are positions in `ids`.
  graph: DiGraph<usize, ()>,
  ids: Vec<String>,
  nodes: HashMap<String, NodeIndex>,
}

impl ExecutionDag {
  pub fn from_specs(specs: &[ResourceSpec]) -> Result<Self, ResolveError> {
    let refs: Vec<&ResourceSpec> = specs.iter().collect();
    let graph = ordering_graph(&refs);

    if petgraph::algo::toposort(&graph, None).is_err() {
      return Err(ResolveError::DependencyCycle(cycle_members(&graph, &refs)));
    }

    let ids: Vec<String> = specs.iter().map(|s| s.id.clone()).collect();
    let nodes = graph
      .node_indices()
      .map(|idx| (ids[graph[idx]].clone(), idx))
      .collect();

    Ok(Self { graph, ids, nodes })
  }

  /// Spec positions grouped into waves, dependencies first.
  ///
  /// Within a wave positions are ascending, so the order is deterministic.
  pub fn waves(&self) -> Vec<Vec<usize>> {
    let mut in_degree: Vec<usize> = self
      .graph
      .node_indices()
      .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
      .collect();

    let mut current: Vec<NodeIndex> = self
      .graph
      .node_indices()
      .filter(|idx| in_degree[idx.index()] == 0)
      .collect();
    let mut waves = Vec::new();

    while !current.is_empty() {
      let mut next = Vec::new();
      for &idx in &current {
        for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          in_degree[dependent.index()] -= 1;
          if in_degree[dependent.index()] == 0 {
            next.push(dependent);
          }
        }
      }

      let mut wave: Vec<usize> = current.iter().map(|&idx| self.graph[idx]).collect();
      wave.sort_unstable();
      waves.push(wave);
      current = next;
    }

    waves
  }

  /// Direct dependencies of `id` within this run.
  pub fn dependencies(&self, id: &str) -> Vec<&str> {
    self.neighbors(id, Direction::Incoming)
  }

  /// Direct dependents of `id` within this run.
  pub fn dependents(&self, id: &str) -> Vec<&str> {
    self.neighbors(id, Direction::Outgoing)
  }

  fn neighbors(&self, id: &str, direction: Direction) -> Vec<&str> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };

    let mut ids: Vec<&str> = self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| self.ids[self.graph[n]].as_str())
      .collect();
    ids.sort_unstable();
    ids
  }

  pub fn len(&self) -> usize {
    self.ids.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }
}
