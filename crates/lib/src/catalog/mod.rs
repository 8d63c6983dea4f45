//! The resource catalog: the static table of every manageable resource.
//!
//! A catalog is loaded from TOML:
//!
//! ```toml
//! [[resource]]
//! id = "vpc"
//! scope = "base"
//! kind = "aws_vpc"
//! tags = { Type = "networking" }
//!
//! [[resource]]
//! id = "ecs_service"
//! scope = "runtime"
//! kind = "aws_ecs_service"
//! depends_on = ["ecs_cluster"]
//! references = { vpc = { Type = "networking" } }
//! ```
//!
//! Loading validates the structural rules (unique ids, known dependencies,
//! base never relying on runtime). Cycles are detected later by the scope
//! resolver, on the subgraph actually selected.

pub mod types;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub use types::{ResourceScope, ResourceSpec, TagQuery};

/// Errors raised while loading or validating a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
  #[error("failed to read catalog {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse catalog {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("duplicate resource id '{0}' in catalog")]
  DuplicateId(String),

  #[error("resource '{id}' depends on unknown resource '{dependency}'")]
  UnknownDependency { id: String, dependency: String },

  #[error("base resource '{id}' depends on runtime resource '{dependency}'")]
  BaseDependsOnRuntime { id: String, dependency: String },

  #[error("base resource '{id}' declares cross-scope reference '{reference}'; only runtime resources may reference base")]
  BaseReference { id: String, reference: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
  #[serde(default, rename = "resource")]
  resources: Vec<ResourceSpec>,
}

/// An ordered, validated set of resource specs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
  specs: Vec<ResourceSpec>,
}

impl Catalog {
  /// Build a catalog from specs, validating the structural rules.
  pub fn new(specs: Vec<ResourceSpec>) -> Result<Self, CatalogError> {
    validate(&specs)?;
    Ok(Self { specs })
  }

  /// Load and validate a catalog file.
  pub fn load(path: &Path) -> Result<Self, CatalogError> {
    let content = fs::read_to_string(path).map_err(|source| CatalogError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let catalog = Self::parse(&content).map_err(|e| match e {
      ParseOrInvalid::Parse(source) => CatalogError::Parse {
        path: path.to_path_buf(),
        source,
      },
      ParseOrInvalid::Invalid(e) => e,
    })?;
    debug!(path = %path.display(), resources = catalog.len(), "loaded catalog");
    Ok(catalog)
  }

  /// Parse catalog TOML from a string.
  pub fn from_toml(content: &str) -> Result<Self, CatalogError> {
    Self::parse(content).map_err(|e| match e {
      ParseOrInvalid::Parse(source) => CatalogError::Parse {
        path: PathBuf::from("<inline>"),
        source,
      },
      ParseOrInvalid::Invalid(e) => e,
    })
  }

  fn parse(content: &str) -> Result<Self, ParseOrInvalid> {
    let file: CatalogFile = toml::from_str(content).map_err(ParseOrInvalid::Parse)?;
    Self::new(file.resources).map_err(ParseOrInvalid::Invalid)
  }

  pub fn specs(&self) -> &[ResourceSpec] {
    &self.specs
  }

  pub fn get(&self, id: &str) -> Option<&ResourceSpec> {
    self.specs.iter().find(|s| s.id == id)
  }

  pub fn contains(&self, id: &str) -> bool {
    self.get(id).is_some()
  }

  pub fn len(&self) -> usize {
    self.specs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.specs.is_empty()
  }
}

enum ParseOrInvalid {
  Parse(toml::de::Error),
  Invalid(CatalogError),
}

fn validate(specs: &[ResourceSpec]) -> Result<(), CatalogError> {
  let mut seen = HashSet::new();
  for spec in specs {
    if !seen.insert(spec.id.as_str()) {
      return Err(CatalogError::DuplicateId(spec.id.clone()));
    }
  }

  for spec in specs {
    for dep in &spec.depends_on {
      let Some(target) = specs.iter().find(|s| &s.id == dep) else {
        return Err(CatalogError::UnknownDependency {
          id: spec.id.clone(),
          dependency: dep.clone(),
        });
      };
      if spec.scope() == ResourceScope::Base && target.scope() == ResourceScope::Runtime {
        return Err(CatalogError::BaseDependsOnRuntime {
          id: spec.id.clone(),
          dependency: dep.clone(),
        });
      }
    }

    if spec.scope() == ResourceScope::Base
      && let Some(name) = spec.references.keys().next()
    {
      return Err(CatalogError::BaseReference {
        id: spec.id.clone(),
        reference: name.clone(),
      });
    }
  }

  Ok(())
}
