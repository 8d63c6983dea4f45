use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::ResourceScope;
use crate::provider::ProviderHandle;

use super::StoreError;

/// Current on-disk format of a partition file.
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Identifies one independently locked state partition: `(scope, env)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
  pub scope: ResourceScope,
  pub env: String,
}

impl PartitionKey {
  pub fn new(scope: ResourceScope, env: impl Into<String>) -> Self {
    Self { scope, env: env.into() }
  }
}

impl fmt::Display for PartitionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.scope, self.env)
  }
}

/// A resource that has actually been provisioned and is tracked in state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedResource {
  pub spec_id: String,
  pub provider_handle: ProviderHandle,
  pub created_at: DateTime<Utc>,
  pub scope: ResourceScope,
  pub kind: String,
  #[serde(default)]
  pub tags: BTreeMap<String, String>,
}

/// The materialized resources of one partition plus its version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeState {
  pub format: u32,
  pub partition: PartitionKey,
  /// Incremented on every save; used to detect external mutation.
  pub version: u64,
  resources: Vec<MaterializedResource>,
}

impl ScopeState {
  pub fn empty(partition: PartitionKey) -> Self {
    Self {
      format: STATE_FORMAT_VERSION,
      partition,
      version: 0,
      resources: Vec::new(),
    }
  }

  pub fn resources(&self) -> &[MaterializedResource] {
    &self.resources
  }

  pub fn get(&self, spec_id: &str) -> Option<&MaterializedResource> {
    self.resources.iter().find(|r| r.spec_id == spec_id)
  }

  pub fn contains(&self, spec_id: &str) -> bool {
    self.get(spec_id).is_some()
  }

  pub fn len(&self) -> usize {
    self.resources.len()
  }

  pub fn is_empty(&self) -> bool {
    self.resources.is_empty()
  }

  /// Insert or replace the record for `resource.spec_id`.
  ///
  /// Rejects records belonging to the other lifecycle group: a partition
  /// only ever holds resources of its own scope.
  pub fn record(&mut self, resource: MaterializedResource) -> Result<(), StoreError> {
    if resource.scope != self.partition.scope {
      return Err(StoreError::ScopeMismatch {
        partition: self.partition.clone(),
        spec_id: resource.spec_id,
        scope: resource.scope,
      });
    }

    match self.resources.iter_mut().find(|r| r.spec_id == resource.spec_id) {
      Some(existing) => *existing = resource,
      None => self.resources.push(resource),
    }
    Ok(())
  }

  pub fn remove(&mut self, spec_id: &str) -> Option<MaterializedResource> {
    let pos = self.resources.iter().position(|r| r.spec_id == spec_id)?;
    Some(self.resources.remove(pos))
  }

  /// Check the invariants a freshly loaded file must satisfy.
  pub(crate) fn validate(&self) -> Result<(), StoreError> {
    let mut seen = std::collections::HashSet::new();
    for resource in &self.resources {
      if !seen.insert(resource.spec_id.as_str()) {
        return Err(StoreError::Corrupt {
          partition: self.partition.clone(),
          message: format!("duplicate record for '{}'", resource.spec_id),
        });
      }
      if resource.scope != self.partition.scope {
        return Err(StoreError::Corrupt {
          partition: self.partition.clone(),
          message: format!("'{}' has scope {}", resource.spec_id, resource.scope),
        });
      }
    }
    Ok(())
  }
}
