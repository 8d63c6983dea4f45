//! The resource provider boundary.
//!
//! The orchestrator never talks to a cloud API directly. Everything goes
//! through [`ResourceProvider`], which exposes create/destroy plus two read
//! operations: `describe` for a single handle and `list` for tag queries
//! against the provider's live inventory.

pub mod local;
pub mod memory;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{ResourceScope, ResourceSpec, TagQuery};
use crate::consts::{APP_NAME, tags};

pub use local::LocalProvider;
pub use memory::MemoryProvider;

/// Opaque identifier returned by the provider for a created resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderHandle(pub String);

impl fmt::Display for ProviderHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for ProviderHandle {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

/// One resource as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
  pub handle: ProviderHandle,
  pub kind: String,
  pub tags: BTreeMap<String, String>,
}

/// Everything the provider needs to create one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRequest {
  pub spec_id: String,
  pub kind: String,
  pub scope: ResourceScope,
  pub env: String,
  /// Declared tags merged with the standard tags.
  pub tags: BTreeMap<String, String>,
  /// Handles of the spec's in-run dependencies, keyed by spec id.
  pub dependencies: BTreeMap<String, ProviderHandle>,
  /// Handles found through cross-scope references, keyed by reference name.
  pub references: BTreeMap<String, ProviderHandle>,
}

impl CreateRequest {
  pub fn for_spec(spec: &ResourceSpec, env: &str) -> Self {
    Self {
      spec_id: spec.id.clone(),
      kind: spec.kind.clone(),
      scope: spec.scope(),
      env: env.to_string(),
      tags: standard_tags(spec, env),
      dependencies: BTreeMap::new(),
      references: BTreeMap::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestroyRequest {
  pub spec_id: String,
  pub kind: String,
  pub scope: ResourceScope,
  pub env: String,
  pub handle: ProviderHandle,
}

/// The declared tags of a spec plus the tags every managed resource carries.
///
/// Declared tags win over standard ones, except `SpecId` and `ManagedBy`
/// which always identify the owner.
pub fn standard_tags(spec: &ResourceSpec, env: &str) -> BTreeMap<String, String> {
  let mut merged = BTreeMap::new();
  merged.insert(tags::ENVIRONMENT.to_string(), env.to_string());
  merged.insert(tags::SCOPE.to_string(), spec.scope().as_str().to_string());
  merged.extend(spec.tags.clone());
  merged.insert(tags::MANAGED_BY.to_string(), APP_NAME.to_string());
  merged.insert(tags::SPEC_ID.to_string(), spec.id.clone());
  merged
}

/// Widen a reference query so it only ever matches base resources of `env`.
pub fn scoped_reference_query(query: &TagQuery, env: &str) -> TagQuery {
  query
    .clone()
    .with_default(tags::ENVIRONMENT, env)
    .with_default(tags::SCOPE, ResourceScope::Base.as_str())
}

/// Provider error categories, split by whether a retry can help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
  /// Rate limit exceeded (retryable with backoff).
  #[error("rate limit exceeded: {0}")]
  Throttled(String),

  /// A just-created dependency is not visible yet (eventual consistency, retryable).
  #[error("not yet visible: {0}")]
  NotYetVisible(String),

  /// Resource still has dependent objects (retryable).
  #[error("resource has dependent objects: {0}")]
  DependencyViolation(String),

  /// Resource does not exist.
  #[error("resource not found: {0}")]
  NotFound(String),

  /// The provider refused the request.
  #[error("request rejected: {0}")]
  Rejected(String),

  /// The call did not finish within the configured timeout.
  #[error("provider call timed out after {0:?}")]
  Timeout(std::time::Duration),

  /// Local failure talking to the provider backend.
  #[error("provider i/o error: {0}")]
  Io(String),
}

impl ProviderError {
  /// Whether the error is transient and the call may be retried.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      ProviderError::Throttled(_) | ProviderError::NotYetVisible(_) | ProviderError::DependencyViolation(_)
    )
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, ProviderError::NotFound(_))
  }
}

impl From<std::io::Error> for ProviderError {
  fn from(e: std::io::Error) -> Self {
    ProviderError::Io(e.to_string())
  }
}

/// The opaque cloud API the orchestrator drives.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
  /// Human-readable provider name for logs.
  fn name(&self) -> &str;

  async fn create(&self, request: &CreateRequest) -> Result<ProviderHandle, ProviderError>;

  async fn destroy(&self, request: &DestroyRequest) -> Result<(), ProviderError>;

  /// Look up one resource; `Ok(None)` if it no longer exists.
  async fn describe(&self, handle: &ProviderHandle) -> Result<Option<InventoryItem>, ProviderError>;

  /// All live resources whose tags satisfy `query`.
  async fn list(&self, query: &TagQuery) -> Result<Vec<InventoryItem>, ProviderError>;
}
