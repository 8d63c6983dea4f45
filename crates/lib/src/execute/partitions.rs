//! The locked partitions one run reads and writes.

use std::time::Duration;

use tracing::debug;

use crate::catalog::ResourceScope;
use crate::scope::DeploymentScope;
use crate::state::{LockMode, MaterializedResource, PartitionKey, PartitionLock, ScopeState, StateStore, StoreError};

#[derive(Debug)]
struct LockedPartition {
  lock: PartitionLock,
  state: ScopeState,
  dirty: bool,
}

/// Every partition a run touches, locked and loaded.
///
/// Locks are taken in [`DeploymentScope::partitions`] order (base before
/// runtime) and released together when the set is dropped.
#[derive(Debug)]
pub struct PartitionSet {
  store: StateStore,
  env: String,
  partitions: Vec<LockedPartition>,
}

impl PartitionSet {
  /// Lock and load the partitions of `scope` in `env`.
  pub async fn acquire(
    store: &StateStore,
    scope: DeploymentScope,
    env: &str,
    mode: LockMode,
    command: &str,
    wait: Duration,
  ) -> Result<Self, StoreError> {
    let mut partitions = Vec::new();
    for resource_scope in scope.partitions() {
      let key = PartitionKey::new(resource_scope, env);
      let lock = store.lock(&key, mode, command, wait).await?;
      let state = store.load(&lock)?;
      debug!(partition = %key, version = state.version, resources = state.len(), "loaded partition");
      partitions.push(LockedPartition {
        lock,
        state,
        dirty: false,
      });
    }

    Ok(Self {
      store: store.clone(),
      env: env.to_string(),
      partitions,
    })
  }

  pub fn env(&self) -> &str {
    &self.env
  }

  pub fn scopes(&self) -> Vec<ResourceScope> {
    self.partitions.iter().map(|p| p.state.partition.scope).collect()
  }

  pub fn state(&self, scope: ResourceScope) -> Option<&ScopeState> {
    self.partition(scope).map(|p| &p.state)
  }

  pub fn states(&self) -> impl Iterator<Item = &ScopeState> {
    self.partitions.iter().map(|p| &p.state)
  }

  pub fn get(&self, scope: ResourceScope, spec_id: &str) -> Option<&MaterializedResource> {
    self.state(scope)?.get(spec_id)
  }

  /// Look a record up in any held partition.
  pub fn find(&self, spec_id: &str) -> Option<&MaterializedResource> {
    self.states().find_map(|state| state.get(spec_id))
  }

  /// Write a record to the partition of its own scope.
  pub fn record(&mut self, resource: MaterializedResource) -> Result<(), StoreError> {
    let key = PartitionKey::new(resource.scope, self.env.clone());
    let partition = self.partition_mut(resource.scope).ok_or(StoreError::NotLocked(key))?;
    partition.state.record(resource)?;
    partition.dirty = true;
    Ok(())
  }

  pub fn remove(&mut self, scope: ResourceScope, spec_id: &str) -> Option<MaterializedResource> {
    let partition = self.partition_mut(scope)?;
    let removed = partition.state.remove(spec_id)?;
    partition.dirty = true;
    Some(removed)
  }

  /// Save every partition changed since the last save.
  pub fn save_dirty(&mut self) -> Result<(), StoreError> {
    for partition in self.partitions.iter_mut().filter(|p| p.dirty) {
      self.store.save(&partition.lock, &mut partition.state)?;
      partition.dirty = false;
    }
    Ok(())
  }

  fn partition(&self, scope: ResourceScope) -> Option<&LockedPartition> {
    self.partitions.iter().find(|p| p.state.partition.scope == scope)
  }

  fn partition_mut(&mut self, scope: ResourceScope) -> Option<&mut LockedPartition> {
    self.partitions.iter_mut().find(|p| p.state.partition.scope == scope)
  }
}
