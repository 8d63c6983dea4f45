//! Cross-scope references: runtime resources finding base resources by tag.
//!
//! A runtime spec never points at a base resource's handle directly. It
//! declares a tag query, and the query is evaluated against the provider's
//! live inventory at execution time. Base resources can therefore be
//! recreated (with new handles) without touching any runtime spec.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::catalog::{ResourceSpec, TagQuery};
use crate::execute::retry::{RetryError, RetryPolicy};
use crate::provider::{InventoryItem, ProviderError, ProviderHandle, ResourceProvider, scoped_reference_query};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
  #[error("no resource matches {query}; run a base deployment for this environment first")]
  NotFound { query: TagQuery },

  #[error(
    "{} resources match {query} ({}); refusing to guess",
    .matches.len(),
    .matches.iter().map(|h| h.0.as_str()).collect::<Vec<_>>().join(", ")
  )]
  Ambiguous {
    query: TagQuery,
    matches: Vec<ProviderHandle>,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
  #[error("reference '{name}': {source}")]
  Lookup {
    name: String,
    #[source]
    source: LookupError,
  },

  #[error("reference '{name}': inventory query failed after {attempts} attempt(s): {source}")]
  Provider {
    name: String,
    attempts: u32,
    #[source]
    source: ProviderError,
  },

  #[error("reference '{name}': cancelled")]
  Cancelled { name: String },
}

/// Find the single inventory item matching `query`.
pub fn lookup(query: &TagQuery, snapshot: &[InventoryItem]) -> Result<ProviderHandle, LookupError> {
  let mut matches: Vec<&InventoryItem> = snapshot.iter().filter(|item| query.matches(&item.tags)).collect();

  match matches.len() {
    0 => Err(LookupError::NotFound { query: query.clone() }),
    1 => Ok(matches.remove(0).handle.clone()),
    _ => {
      let mut handles: Vec<ProviderHandle> = matches.into_iter().map(|item| item.handle.clone()).collect();
      handles.sort();
      Err(LookupError::Ambiguous {
        query: query.clone(),
        matches: handles,
      })
    }
  }
}

/// Resolves a spec's references against the provider's live inventory.
pub struct ReferenceResolver<'a> {
  provider: &'a dyn ResourceProvider,
  retry: &'a RetryPolicy,
  env: &'a str,
}

impl<'a> ReferenceResolver<'a> {
  pub fn new(provider: &'a dyn ResourceProvider, retry: &'a RetryPolicy, env: &'a str) -> Self {
    Self { provider, retry, env }
  }

  /// Resolve every reference of `spec`, keyed by reference name.
  ///
  /// Queries are widened with `Environment=<env>` and `Scope=base`, so a
  /// reference can only ever land on a base resource of the same environment.
  pub async fn resolve(&self, spec: &ResourceSpec) -> Result<BTreeMap<String, ProviderHandle>, ReferenceError> {
    let mut resolved = BTreeMap::new();

    for (name, query) in &spec.references {
      let query = scoped_reference_query(query, self.env);

      let snapshot = self
        .retry
        .run(&format!("list {}", query), || self.provider.list(&query))
        .await
        .map_err(|e| match e {
          RetryError::Cancelled => ReferenceError::Cancelled { name: name.clone() },
          RetryError::Failed { attempts, source } => ReferenceError::Provider {
            name: name.clone(),
            attempts,
            source,
          },
        })?;

      let handle = lookup(&query, &snapshot).map_err(|source| ReferenceError::Lookup {
        name: name.clone(),
        source,
      })?;

      debug!(spec = %spec.id, reference = %name, handle = %handle, "resolved cross-scope reference");
      resolved.insert(name.clone(), handle);
    }

    Ok(resolved)
  }
}
