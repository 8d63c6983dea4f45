//! Scope resolution: which catalog entries a deployment touches, and in what order.
//!
//! [`resolve`] is a pure function of the catalog and the requested
//! [`DeploymentScope`]. It filters the catalog, builds the dependency graph
//! induced by the selected specs and returns them in a stable topological
//! order (ties broken by catalog position).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::str::FromStr;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::catalog::{ResourceScope, ResourceSpec, TagQuery};
use crate::consts::{APP_NAME, tags};

/// The scope requested for one invocation. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentScope {
  Base,
  Runtime,
  All,
}

impl DeploymentScope {
  /// Whether a spec belongs to this deployment.
  pub fn should_create(self, spec: &ResourceSpec) -> bool {
    self.includes(spec.scope())
  }

  pub fn includes(self, scope: ResourceScope) -> bool {
    match self {
      DeploymentScope::All => true,
      DeploymentScope::Base => scope == ResourceScope::Base,
      DeploymentScope::Runtime => scope == ResourceScope::Runtime,
    }
  }

  /// The state partitions this scope touches, in lock order.
  pub fn partitions(self) -> Vec<ResourceScope> {
    match self {
      DeploymentScope::Base => vec![ResourceScope::Base],
      DeploymentScope::Runtime => vec![ResourceScope::Runtime],
      DeploymentScope::All => vec![ResourceScope::Base, ResourceScope::Runtime],
    }
  }

  pub fn touches_base(self) -> bool {
    self.includes(ResourceScope::Base)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      DeploymentScope::Base => "base",
      DeploymentScope::Runtime => "runtime",
      DeploymentScope::All => "all",
    }
  }
}

impl fmt::Display for DeploymentScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DeploymentScope {
  type Err = ScopeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "base" => Ok(DeploymentScope::Base),
      "runtime" => Ok(DeploymentScope::Runtime),
      "all" => Ok(DeploymentScope::All),
      _ => Err(ScopeError::InvalidScope(s.to_string())),
    }
  }
}

impl From<ResourceScope> for DeploymentScope {
  fn from(scope: ResourceScope) -> Self {
    match scope {
      ResourceScope::Base => DeploymentScope::Base,
      ResourceScope::Runtime => DeploymentScope::Runtime,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
  #[error("invalid scope '{0}': expected one of base, runtime, all")]
  InvalidScope(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
  /// The selected specs do not form a DAG. Ids are sorted.
  #[error("dependency cycle detected between: {}", .0.join(", "))]
  DependencyCycle(Vec<String>),
}

/// Select the specs belonging to `scope`, in dependency order.
///
/// Dependencies that fall outside the selection are ignored; they belong to
/// the other lifecycle group and are reached through cross-scope references.
/// When both groups are selected, a runtime reference whose query is
/// satisfied by a base spec's declared tags becomes an ordering edge.
pub fn resolve(catalog: &[ResourceSpec], scope: DeploymentScope) -> Result<Vec<ResourceSpec>, ResolveError> {
  let selected: Vec<&ResourceSpec> = catalog.iter().filter(|s| scope.should_create(s)).collect();

  let graph = ordering_graph(&selected);
  let order = stable_toposort(&graph).ok_or_else(|| ResolveError::DependencyCycle(cycle_members(&graph, &selected)))?;

  debug!(scope = %scope, selected = order.len(), "resolved deployment scope");

  Ok(order.into_iter().map(|pos| selected[pos].clone()).collect())
}

/// The graph of ordering constraints between `specs`, one node per spec
/// holding its position. Edges point from dependency to dependent.
pub(crate) fn ordering_graph(specs: &[&ResourceSpec]) -> DiGraph<usize, ()> {
  let mut graph: DiGraph<usize, ()> = DiGraph::new();
  let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
  for (pos, spec) in specs.iter().enumerate() {
    nodes.insert(spec.id.as_str(), graph.add_node(pos));
  }

  for spec in specs {
    let dependent = nodes[spec.id.as_str()];

    for dep in &spec.depends_on {
      if let Some(&dependency) = nodes.get(dep.as_str()) {
        graph.update_edge(dependency, dependent, ());
      }
    }

    for query in spec.references.values() {
      for candidate in specs {
        if candidate.scope() == ResourceScope::Base && candidate.id != spec.id && will_satisfy(candidate, query) {
          graph.update_edge(nodes[candidate.id.as_str()], dependent, ());
        }
      }
    }
  }

  graph
}

/// Whether the resource created from `candidate` will match `query`.
///
/// Created resources also carry the standard tags. `Environment` always
/// equals the run's environment unless declared, so it matches anything here.
fn will_satisfy(candidate: &ResourceSpec, query: &TagQuery) -> bool {
  query.0.iter().all(|(key, value)| {
    let declared = candidate.tags.get(key);
    match key.as_str() {
      tags::SPEC_ID => value == &candidate.id,
      tags::MANAGED_BY => value == APP_NAME,
      tags::ENVIRONMENT => declared.is_none_or(|d| d == value),
      tags::SCOPE => declared.map_or(value == candidate.scope().as_str(), |d| d == value),
      _ => declared == Some(value),
    }
  })
}

/// Kahn's algorithm, always emitting the ready node with the lowest catalog
/// position. Returns `None` if the graph has a cycle.
fn stable_toposort(graph: &DiGraph<usize, ()>) -> Option<Vec<usize>> {
  let mut in_degree: Vec<usize> = graph
    .node_indices()
    .map(|idx| graph.neighbors_directed(idx, petgraph::Direction::Incoming).count())
    .collect();

  let mut ready: BinaryHeap<Reverse<usize>> = graph
    .node_indices()
    .filter(|idx| in_degree[idx.index()] == 0)
    .map(|idx| Reverse(idx.index()))
    .collect();

  let mut order = Vec::with_capacity(graph.node_count());
  while let Some(Reverse(index)) = ready.pop() {
    let idx = NodeIndex::new(index);
    order.push(graph[idx]);
    for next in graph.neighbors_directed(idx, petgraph::Direction::Outgoing) {
      in_degree[next.index()] -= 1;
      if in_degree[next.index()] == 0 {
        ready.push(Reverse(next.index()));
      }
    }
  }

  (order.len() == graph.node_count()).then_some(order)
}

pub(crate) fn cycle_members(graph: &DiGraph<usize, ()>, selected: &[&ResourceSpec]) -> Vec<String> {
  let mut ids: Vec<String> = tarjan_scc(graph)
    .into_iter()
    .filter(|component| component.len() > 1 || graph.contains_edge(component[0], component[0]))
    .flatten()
    .map(|idx| selected[graph[idx]].id.clone())
    .collect();
  ids.sort();
  ids
}
