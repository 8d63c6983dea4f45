//! Orchestration of one deploy command against one environment.
//!
//! The order of operations is fixed: parse and resolve the scope, run the
//! destruction guard, then lock the touched partitions (base before runtime)
//! and hand over to the executor. Everything before the locks is pure, so a
//! rejected request never touches state or the provider.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::catalog::{Catalog, CatalogError, ResourceSpec};
use crate::config::{ConfigError, DeployConfig};
use crate::execute::{Action, ApplyReport, Executor, ExecutorError, PartitionSet};
use crate::guard::{DestructionGuard, GuardError};
use crate::plan::Plan;
use crate::provider::{LocalProvider, ResourceProvider};
use crate::scope::{self, DeploymentScope, ResolveError, ScopeError};
use crate::state::{LockMode, ScopeState, StateStore, StoreError};

/// Process exit codes.
pub mod exit_code {
  pub const SUCCESS: i32 = 0;
  pub const FAILURE: i32 = 1;
  pub const CONFIRMATION_REQUIRED: i32 = 2;
  pub const INVALID_INPUT: i32 = 3;
}

#[derive(Debug, Error)]
pub enum DeployError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Catalog(#[from] CatalogError),

  #[error(transparent)]
  Scope(#[from] ScopeError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Guard(#[from] GuardError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Executor(#[from] ExecutorError),
}

impl DeployError {
  pub fn exit_code(&self) -> i32 {
    match self {
      DeployError::Guard(_) => exit_code::CONFIRMATION_REQUIRED,
      DeployError::Scope(_)
      | DeployError::Resolve(_)
      | DeployError::Catalog(_)
      | DeployError::Executor(ExecutorError::Dag(_)) => exit_code::INVALID_INPUT,
      DeployError::Config(_) | DeployError::Store(_) | DeployError::Executor(_) => exit_code::FAILURE,
    }
  }

  /// The apply report, if the run got as far as the executor.
  pub fn report(&self) -> Option<&ApplyReport> {
    match self {
      DeployError::Executor(e) => e.report(),
      _ => None,
    }
  }
}

/// Options of an `up` or `down` run.
#[derive(Debug, Clone)]
pub struct DeployRequest {
  pub scope: DeploymentScope,
  /// Confirmation token for destroying base resources.
  pub confirm: Option<String>,
  pub refresh: bool,
  pub fail_fast: bool,
  /// Overrides `[settings].parallelism`.
  pub parallelism: Option<usize>,
}

impl DeployRequest {
  pub fn new(scope: DeploymentScope) -> Self {
    Self {
      scope,
      confirm: None,
      refresh: false,
      fail_fast: false,
      parallelism: None,
    }
  }
}

/// Runs deploy commands for one environment.
pub struct Deployer {
  config: DeployConfig,
  catalog: Catalog,
  env: String,
  store: StateStore,
  provider: Arc<dyn ResourceProvider>,
  cancel: CancellationToken,
  lock_timeout: Duration,
}

impl Deployer {
  pub fn new(
    config: DeployConfig,
    catalog: Catalog,
    env: impl Into<String>,
    store: StateStore,
    provider: Arc<dyn ResourceProvider>,
  ) -> Self {
    Self {
      lock_timeout: config.lock_timeout(),
      config,
      catalog,
      env: env.into(),
      store,
      provider,
      cancel: CancellationToken::new(),
    }
  }

  /// Build a deployer for `env` from configuration: state under the
  /// configured state directory, resources in the local provider.
  pub fn from_config(config: DeployConfig, catalog: Catalog, env: &str) -> Result<Self, DeployError> {
    let environment = config.environment(env)?;
    let store = StateStore::new(config.state_dir());
    let provider = LocalProvider::new(config.inventory_dir(), env, environment.region.clone());
    info!(
      env,
      state_dir = %store.root().display(),
      region = environment.region.as_deref().unwrap_or("-"),
      "using local provider"
    );
    Ok(Self::new(config, catalog, env, store, Arc::new(provider)))
  }

  pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
    self.cancel = cancel;
    self
  }

  /// How long to wait for a partition held by another process.
  pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
    self.lock_timeout = timeout;
    self
  }

  pub fn env(&self) -> &str {
    &self.env
  }

  pub fn guard(&self) -> DestructionGuard {
    DestructionGuard::new(self.config.settings.base_destroy_policy)
  }

  /// Catalog entries of `scope`, in dependency order.
  pub fn resolve(&self, scope: DeploymentScope) -> Result<Vec<ResourceSpec>, DeployError> {
    Ok(scope::resolve(self.catalog.specs(), scope)?)
  }

  /// Check the destruction guard without touching state.
  pub fn authorize(&self, action: Action, scope: DeploymentScope, confirm: Option<&str>) -> Result<(), DeployError> {
    Ok(self.guard().authorize(action, scope, confirm)?)
  }

  /// What `up` (or `down`, for [`Action::Destroy`]) would do. No provider calls.
  pub async fn plan(&self, action: Action, scope: DeploymentScope) -> Result<Plan, DeployError> {
    let specs = self.resolve(scope)?;
    let partitions = self.lock(scope, LockMode::Shared, "plan").await?;
    let states: Vec<&ScopeState> = partitions.states().collect();
    Ok(Plan::compute(action, scope, &self.env, &specs, &states))
  }

  /// Create every spec of the requested scope that is not yet materialized.
  pub async fn up(&self, request: &DeployRequest) -> Result<ApplyReport, DeployError> {
    self.apply(Action::Create, request).await
  }

  /// Destroy every materialized resource of the requested scope.
  pub async fn down(&self, request: &DeployRequest) -> Result<ApplyReport, DeployError> {
    self.apply(Action::Destroy, request).await
  }

  /// Current state of both partitions of the environment.
  pub async fn status(&self) -> Result<Vec<ScopeState>, DeployError> {
    let partitions = self.lock(DeploymentScope::All, LockMode::Shared, "status").await?;
    Ok(partitions.states().cloned().collect())
  }

  async fn apply(&self, action: Action, request: &DeployRequest) -> Result<ApplyReport, DeployError> {
    let specs = self.resolve(request.scope)?;
    self.authorize(action, request.scope, request.confirm.as_deref())?;

    let command = format!("{} --scope={} --env={}", action, request.scope, self.env);
    let mut partitions = self.lock(request.scope, LockMode::Exclusive, &command).await?;

    let mut config = self.config.execute_config(self.cancel.clone());
    config.refresh = request.refresh;
    config.fail_fast = request.fail_fast;
    if let Some(parallelism) = request.parallelism {
      config.parallelism = parallelism.max(1);
    }

    let executor = Executor::new(self.provider.clone(), config);
    Ok(executor.apply(&specs, action, &mut partitions).await?)
  }

  async fn lock(&self, scope: DeploymentScope, mode: LockMode, command: &str) -> Result<PartitionSet, DeployError> {
    Ok(PartitionSet::acquire(&self.store, scope, &self.env, mode, command, self.lock_timeout).await?)
  }
}
