//! Plans: what an apply would do, computed from state alone.
//!
//! A plan never calls the provider. It compares the resolved specs with the
//! records of the touched partitions.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::catalog::{ResourceScope, ResourceSpec};
use crate::execute::Action;
use crate::provider::ProviderHandle;
use crate::scope::DeploymentScope;
use crate::state::{MaterializedResource, ScopeState};

/// One line of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
  pub id: String,
  pub scope: ResourceScope,
  pub kind: String,
  /// Set when the resource is materialized.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub handle: Option<ProviderHandle>,
}

impl PlanEntry {
  fn planned(spec: &ResourceSpec) -> Self {
    Self {
      id: spec.id.clone(),
      scope: spec.scope(),
      kind: spec.kind.clone(),
      handle: None,
    }
  }

  fn recorded(record: &MaterializedResource) -> Self {
    Self {
      id: record.spec_id.clone(),
      scope: record.scope,
      kind: record.kind.clone(),
      handle: Some(record.provider_handle.clone()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
  pub action: Action,
  pub scope: DeploymentScope,
  pub env: String,
  /// Specs without a record, in creation order.
  pub to_create: Vec<PlanEntry>,
  /// Records to remove, in destruction order: runtime before base, each
  /// scope's orphans first.
  pub to_destroy: Vec<PlanEntry>,
  /// Already materialized specs (create only).
  pub unchanged: Vec<PlanEntry>,
  /// Specs with nothing recorded (destroy only).
  pub absent: Vec<PlanEntry>,
  /// Records whose spec is no longer in the catalog.
  pub orphaned: Vec<PlanEntry>,
}

impl Plan {
  /// Diff `specs` (in resolved order) against the records in `states`.
  pub fn compute(
    action: Action,
    scope: DeploymentScope,
    env: &str,
    specs: &[ResourceSpec],
    states: &[&ScopeState],
  ) -> Self {
    let find = |spec: &ResourceSpec| {
      states
        .iter()
        .filter(|s| s.partition.scope == spec.scope())
        .find_map(|s| s.get(&spec.id))
    };

    let known: HashSet<&str> = specs.iter().map(|s| s.id.as_str()).collect();
    let orphaned: Vec<PlanEntry> = states
      .iter()
      .flat_map(|s| s.resources().iter())
      .filter(|r| !known.contains(r.spec_id.as_str()))
      .map(PlanEntry::recorded)
      .collect();

    let mut plan = Plan {
      action,
      scope,
      env: env.to_string(),
      to_create: Vec::new(),
      to_destroy: Vec::new(),
      unchanged: Vec::new(),
      absent: Vec::new(),
      orphaned,
    };

    match action {
      Action::Create => {
        for spec in specs {
          match find(spec) {
            Some(record) => plan.unchanged.push(PlanEntry::recorded(record)),
            None => plan.to_create.push(PlanEntry::planned(spec)),
          }
        }
      }
      Action::Destroy => {
        for scope in [ResourceScope::Runtime, ResourceScope::Base] {
          plan
            .to_destroy
            .extend(plan.orphaned.iter().filter(|e| e.scope == scope).cloned());
          for spec in specs.iter().rev().filter(|s| s.scope() == scope) {
            match find(spec) {
              Some(record) => plan.to_destroy.push(PlanEntry::recorded(record)),
              None => plan.absent.push(PlanEntry::planned(spec)),
            }
          }
        }
      }
    }

    plan
  }

  /// True when applying the plan would not call the provider.
  pub fn is_noop(&self) -> bool {
    self.to_create.is_empty() && self.to_destroy.is_empty()
  }

  pub fn touches_base(&self) -> bool {
    self
      .to_destroy
      .iter()
      .chain(&self.to_create)
      .any(|e| e.scope == ResourceScope::Base)
  }
}

impl fmt::Display for Plan {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.action {
      Action::Create => write!(
        f,
        "{} to create, {} unchanged",
        self.to_create.len(),
        self.unchanged.len()
      ),
      Action::Destroy => write!(f, "{} to destroy, {} absent", self.to_destroy.len(), self.absent.len()),
    }
  }
}
