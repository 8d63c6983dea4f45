//! Deployment configuration (`deploy.toml`).
//!
//! ```toml
//! catalog = "catalog.toml"          # relative to this file
//!
//! [settings]
//! parallelism = 4
//! lock_timeout_secs = 5
//! max_attempts = 5
//! call_timeout_secs = 600
//! base_destroy_policy = "token-gated"
//!
//! [provider]
//! kind = "local"
//!
//! [environments.dev]
//! region = "us-west-2"
//! ```
//!
//! Every section is optional. Relative paths are resolved against the
//! directory holding the config file.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::execute::{ExecuteConfig, RetryPolicy};
use crate::guard::BaseDestroyPolicy;
use crate::platform::paths;

pub const DEFAULT_CONFIG_FILE: &str = "deploy.toml";
pub const DEFAULT_CATALOG_FILE: &str = "catalog.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("unknown environment '{name}' (configured: {})", .known.join(", "))]
  UnknownEnvironment { name: String, known: Vec<String> },

  #[error("invalid environment name '{0}': use letters, digits, '-' and '_'")]
  InvalidEnvironmentName(String),

  #[error("invalid setting {name}: {message}")]
  InvalidSetting { name: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
  pub parallelism: usize,
  pub lock_timeout_secs: u64,
  /// Total attempts per provider call, including the first.
  pub max_attempts: u32,
  pub call_timeout_secs: u64,
  pub base_destroy_policy: BaseDestroyPolicy,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      parallelism: 4,
      lock_timeout_secs: 5,
      max_attempts: 5,
      call_timeout_secs: 600,
      base_destroy_policy: BaseDestroyPolicy::default(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
  /// File-backed simulated inventory.
  #[default]
  Local,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
  pub kind: ProviderKind,
  pub inventory_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateConfig {
  pub dir: Option<PathBuf>,
}

/// Per-environment provider settings. Opaque to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
  #[serde(default)]
  pub region: Option<String>,
  #[serde(default)]
  pub account: Option<String>,
  #[serde(default)]
  pub profile: Option<String>,
  #[serde(flatten)]
  pub extra: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
  #[serde(default = "default_catalog")]
  pub catalog: PathBuf,
  #[serde(default)]
  pub settings: Settings,
  #[serde(default)]
  pub provider: ProviderConfig,
  #[serde(default)]
  pub state: StateConfig,
  #[serde(default)]
  pub environments: BTreeMap<String, EnvironmentConfig>,
  /// Directory relative paths are resolved against.
  #[serde(skip)]
  base_dir: PathBuf,
}

fn default_catalog() -> PathBuf {
  PathBuf::from(DEFAULT_CATALOG_FILE)
}

impl Default for DeployConfig {
  fn default() -> Self {
    Self {
      catalog: default_catalog(),
      settings: Settings::default(),
      provider: ProviderConfig::default(),
      state: StateConfig::default(),
      environments: BTreeMap::new(),
      base_dir: PathBuf::from("."),
    }
  }
}

impl DeployConfig {
  /// Load a config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let base_dir = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from("."));
    // Keep relative paths stable when the process changes directory later.
    let base_dir = dunce::canonicalize(&base_dir).unwrap_or(base_dir);

    let config = Self::from_toml(&content, base_dir).map_err(|e| match e {
      ConfigError::Parse { source, .. } => ConfigError::Parse {
        path: path.to_path_buf(),
        source,
      },
      other => other,
    })?;
    debug!(path = %path.display(), environments = config.environments.len(), "loaded config");
    Ok(config)
  }

  /// Load `path` if it exists, otherwise fall back to defaults rooted at `base_dir`.
  pub fn load_or_default(path: &Path, base_dir: &Path) -> Result<Self, ConfigError> {
    if path.exists() {
      return Self::load(path);
    }
    debug!(path = %path.display(), "no config file, using defaults");
    Ok(Self {
      base_dir: base_dir.to_path_buf(),
      ..Self::default()
    })
  }

  pub fn from_toml(content: &str, base_dir: PathBuf) -> Result<Self, ConfigError> {
    let mut config: DeployConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: PathBuf::from("<inline>"),
      source,
    })?;
    config.base_dir = base_dir;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<(), ConfigError> {
    if self.settings.parallelism == 0 {
      return Err(ConfigError::InvalidSetting {
        name: "parallelism",
        message: "must be at least 1".into(),
      });
    }
    if self.settings.max_attempts == 0 {
      return Err(ConfigError::InvalidSetting {
        name: "max_attempts",
        message: "must be at least 1".into(),
      });
    }
    for name in self.environments.keys() {
      validate_env_name(name)?;
    }
    Ok(())
  }

  fn resolve(&self, path: &Path) -> PathBuf {
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.base_dir.join(path)
    }
  }

  pub fn catalog_path(&self) -> PathBuf {
    self.resolve(&self.catalog)
  }

  /// State root: `SCOPEDEPLOY_STATE_DIR`, then `[state].dir`, then the data directory.
  pub fn state_dir(&self) -> PathBuf {
    let configured = self.state.dir.as_deref().map(|p| self.resolve(p));
    paths::state_dir(configured.as_ref())
  }

  /// Local provider inventory: `SCOPEDEPLOY_INVENTORY_DIR`, then `[provider].inventory_dir`, then the data directory.
  pub fn inventory_dir(&self) -> PathBuf {
    let configured = self.provider.inventory_dir.as_deref().map(|p| self.resolve(p));
    paths::inventory_dir(configured.as_ref())
  }

  /// Settings of environment `name`.
  ///
  /// When no environments are configured at all, any valid name is accepted
  /// with empty settings.
  pub fn environment(&self, name: &str) -> Result<EnvironmentConfig, ConfigError> {
    validate_env_name(name)?;
    if self.environments.is_empty() {
      return Ok(EnvironmentConfig::default());
    }
    self
      .environments
      .get(name)
      .cloned()
      .ok_or_else(|| ConfigError::UnknownEnvironment {
        name: name.to_string(),
        known: self.environments.keys().cloned().collect(),
      })
  }

  pub fn lock_timeout(&self) -> Duration {
    Duration::from_secs(self.settings.lock_timeout_secs)
  }

  pub fn retry_policy(&self, cancel: CancellationToken) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.settings.max_attempts,
      call_timeout: Duration::from_secs(self.settings.call_timeout_secs),
      cancel,
      ..RetryPolicy::default()
    }
  }

  pub fn execute_config(&self, cancel: CancellationToken) -> ExecuteConfig {
    ExecuteConfig {
      parallelism: self.settings.parallelism,
      retry: self.retry_policy(cancel),
      ..ExecuteConfig::default()
    }
  }
}

/// Environment names end up in file names, so keep them to a safe alphabet.
fn validate_env_name(name: &str) -> Result<(), ConfigError> {
  let valid = !name.is_empty()
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
  if valid {
    Ok(())
  } else {
    Err(ConfigError::InvalidEnvironmentName(name.to_string()))
  }
}
