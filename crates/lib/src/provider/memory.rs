//! In-process provider with call accounting and fault injection.
//!
//! Used by tests to observe exactly which provider calls the executor issued
//! and to script failures (fatal, or transient for the first N attempts).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{CreateRequest, DestroyRequest, InventoryItem, ProviderError, ProviderHandle, ResourceProvider};
use crate::catalog::TagQuery;

/// Number of calls per provider operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
  pub create: usize,
  pub destroy: usize,
  pub describe: usize,
  pub list: usize,
}

impl CallCounts {
  pub fn total(&self) -> usize {
    self.create + self.destroy + self.describe + self.list
  }
}

#[derive(Debug, Clone)]
enum Fault {
  Always(ProviderError),
  Times { remaining: u32, error: ProviderError },
}

impl Fault {
  /// Returns the error to inject for this call, consuming a transient budget.
  fn trigger(&mut self) -> Option<ProviderError> {
    match self {
      Fault::Always(e) => Some(e.clone()),
      Fault::Times { remaining, error } if *remaining > 0 => {
        *remaining -= 1;
        Some(error.clone())
      }
      Fault::Times { .. } => None,
    }
  }
}

#[derive(Debug, Default)]
struct Inner {
  items: BTreeMap<ProviderHandle, InventoryItem>,
  next_id: u64,
  calls: CallCounts,
  create_faults: HashMap<String, Fault>,
  destroy_faults: HashMap<String, Fault>,
  created_order: Vec<String>,
  destroyed_order: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryProvider {
  inner: Mutex<Inner>,
  latency: Option<Duration>,
}

impl MemoryProvider {
  pub fn new() -> Self {
    Self::default()
  }

  /// Delay every call by `latency` before it takes effect.
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = Some(latency);
    self
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Make every create of `spec_id` fail with `error`.
  pub fn fail_create(&self, spec_id: &str, error: ProviderError) {
    self.lock().create_faults.insert(spec_id.to_string(), Fault::Always(error));
  }

  /// Make the first `times` creates of `spec_id` fail with `error`.
  pub fn flaky_create(&self, spec_id: &str, times: u32, error: ProviderError) {
    self
      .lock()
      .create_faults
      .insert(spec_id.to_string(), Fault::Times { remaining: times, error });
  }

  pub fn fail_destroy(&self, spec_id: &str, error: ProviderError) {
    self.lock().destroy_faults.insert(spec_id.to_string(), Fault::Always(error));
  }

  pub fn flaky_destroy(&self, spec_id: &str, times: u32, error: ProviderError) {
    self
      .lock()
      .destroy_faults
      .insert(spec_id.to_string(), Fault::Times { remaining: times, error });
  }

  /// Remove all injected faults.
  pub fn clear_faults(&self) {
    let mut inner = self.lock();
    inner.create_faults.clear();
    inner.destroy_faults.clear();
  }

  /// Insert a resource directly, as if an earlier run (or another tool) created it.
  pub fn seed(&self, kind: &str, tags: BTreeMap<String, String>) -> ProviderHandle {
    let mut inner = self.lock();
    let handle = next_handle(&mut inner, kind);
    inner.items.insert(
      handle.clone(),
      InventoryItem {
        handle: handle.clone(),
        kind: kind.to_string(),
        tags,
      },
    );
    handle
  }

  /// Delete a resource behind the orchestrator's back.
  pub fn remove(&self, handle: &ProviderHandle) -> Option<InventoryItem> {
    self.lock().items.remove(handle)
  }

  pub fn items(&self) -> Vec<InventoryItem> {
    self.lock().items.values().cloned().collect()
  }

  pub fn calls(&self) -> CallCounts {
    self.lock().calls
  }

  pub fn reset_calls(&self) {
    self.lock().calls = CallCounts::default();
  }

  /// Spec ids in the order their creates succeeded.
  pub fn created_order(&self) -> Vec<String> {
    self.lock().created_order.clone()
  }

  /// Spec ids in the order their destroys succeeded.
  pub fn destroyed_order(&self) -> Vec<String> {
    self.lock().destroyed_order.clone()
  }

  async fn simulate_latency(&self) {
    if let Some(latency) = self.latency {
      tokio::time::sleep(latency).await;
    }
  }
}

fn next_handle(inner: &mut Inner, kind: &str) -> ProviderHandle {
  inner.next_id += 1;
  ProviderHandle(format!("{}-{:04}", kind, inner.next_id))
}

#[async_trait]
impl ResourceProvider for MemoryProvider {
  fn name(&self) -> &str {
    "memory"
  }

  async fn create(&self, request: &CreateRequest) -> Result<ProviderHandle, ProviderError> {
    self.lock().calls.create += 1;
    self.simulate_latency().await;

    let mut inner = self.lock();
    if let Some(error) = inner.create_faults.get_mut(&request.spec_id).and_then(Fault::trigger) {
      return Err(error);
    }

    let handle = next_handle(&mut inner, &request.kind);
    inner.items.insert(
      handle.clone(),
      InventoryItem {
        handle: handle.clone(),
        kind: request.kind.clone(),
        tags: request.tags.clone(),
      },
    );
    inner.created_order.push(request.spec_id.clone());
    Ok(handle)
  }

  async fn destroy(&self, request: &DestroyRequest) -> Result<(), ProviderError> {
    self.lock().calls.destroy += 1;
    self.simulate_latency().await;

    let mut inner = self.lock();
    if let Some(error) = inner.destroy_faults.get_mut(&request.spec_id).and_then(Fault::trigger) {
      return Err(error);
    }

    match inner.items.remove(&request.handle) {
      Some(_) => {
        inner.destroyed_order.push(request.spec_id.clone());
        Ok(())
      }
      None => Err(ProviderError::NotFound(request.handle.to_string())),
    }
  }

  async fn describe(&self, handle: &ProviderHandle) -> Result<Option<InventoryItem>, ProviderError> {
    self.lock().calls.describe += 1;
    self.simulate_latency().await;
    Ok(self.lock().items.get(handle).cloned())
  }

  async fn list(&self, query: &TagQuery) -> Result<Vec<InventoryItem>, ProviderError> {
    self.lock().calls.list += 1;
    self.simulate_latency().await;
    Ok(
      self
        .lock()
        .items
        .values()
        .filter(|item| query.matches(&item.tags))
        .cloned()
        .collect(),
    )
  }
}
