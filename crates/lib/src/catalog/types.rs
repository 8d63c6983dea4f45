//! Catalog value types: resource scopes, specs and tag queries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::scope::ScopeError;

/// The lifecycle group a resource belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceScope {
  /// Persistent, slow or expensive to recreate.
  Base,
  /// Ephemeral, cheap and fast to recreate.
  Runtime,
}

impl ResourceScope {
  pub fn as_str(self) -> &'static str {
    match self {
      ResourceScope::Base => "base",
      ResourceScope::Runtime => "runtime",
    }
  }
}

impl fmt::Display for ResourceScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ResourceScope {
  type Err = ScopeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "base" => Ok(ResourceScope::Base),
      "runtime" => Ok(ResourceScope::Runtime),
      _ => Err(ScopeError::InvalidScope(s.to_string())),
    }
  }
}

/// A tag-equality query against a provider inventory.
///
/// Matches an item iff every key/value pair of the query is present on the
/// item. An empty query matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagQuery(pub BTreeMap<String, String>);

impl TagQuery {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder-style insertion of a key/value pair.
  pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.0.insert(key.into(), value.into());
    self
  }

  /// Insert `key=value` unless the query already constrains `key`.
  pub fn with_default(mut self, key: &str, value: &str) -> Self {
    self.0.entry(key.to_string()).or_insert_with(|| value.to_string());
    self
  }

  pub fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
    self.0.iter().all(|(k, v)| tags.get(k) == Some(v))
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl fmt::Display for TagQuery {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("{")?;
    for (i, (k, v)) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str(", ")?;
      }
      write!(f, "{}={}", k, v)?;
    }
    f.write_str("}")
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagQuery {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
  }
}

/// One manageable unit of infrastructure.
///
/// The scope is fixed at construction; there is no way to move a spec
/// between lifecycle groups after it has been declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
  pub id: String,
  scope: ResourceScope,
  pub kind: String,
  #[serde(default)]
  pub depends_on: BTreeSet<String>,
  #[serde(default)]
  pub tags: BTreeMap<String, String>,
  /// Named cross-scope references, resolved by tag query at execution time.
  #[serde(default)]
  pub references: BTreeMap<String, TagQuery>,
}

impl ResourceSpec {
  pub fn new(id: impl Into<String>, scope: ResourceScope, kind: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      scope,
      kind: kind.into(),
      depends_on: BTreeSet::new(),
      tags: BTreeMap::new(),
      references: BTreeMap::new(),
    }
  }

  pub fn scope(&self) -> ResourceScope {
    self.scope
  }

  pub fn depends_on<I, S>(mut self, ids: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.depends_on.extend(ids.into_iter().map(Into::into));
    self
  }

  pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.tags.insert(key.into(), value.into());
    self
  }

  pub fn reference(mut self, name: impl Into<String>, query: TagQuery) -> Self {
    self.references.insert(name.into(), query);
    self
  }
}
