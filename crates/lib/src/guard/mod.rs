//! Destruction guard: destroying base resources needs an explicit token.
//!
//! The guard is a pure check that runs before any lock is taken or any
//! provider call is made. Create is always permitted, and so is destroying
//! runtime resources.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::catalog::{ResourceScope, ResourceSpec};
use crate::consts::DESTROY_BASE_TOKEN;
use crate::execute::Action;
use crate::scope::DeploymentScope;

/// How strictly base destruction is gated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BaseDestroyPolicy {
  /// Any destroy touching base needs the token.
  #[default]
  TokenGated,
  /// Base can only be destroyed together with runtime (`all` + token).
  AllScopeOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
  #[error(
    "destroying scope '{scope}' removes shared base infrastructure; pass --confirm={token} to proceed",
    token = DESTROY_BASE_TOKEN
  )]
  ConfirmationRequired { scope: DeploymentScope },

  #[error("base resources can only be destroyed together with runtime; use --scope=all --confirm={token}", token = DESTROY_BASE_TOKEN)]
  BaseOnlyDestroyForbidden,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DestructionGuard {
  policy: BaseDestroyPolicy,
}

impl DestructionGuard {
  pub fn new(policy: BaseDestroyPolicy) -> Self {
    Self { policy }
  }

  /// Check whether `action` on `scope` may proceed with `token`.
  pub fn authorize(&self, action: Action, scope: DeploymentScope, token: Option<&str>) -> Result<(), GuardError> {
    if action == Action::Create || !scope.touches_base() {
      return Ok(());
    }

    if self.policy == BaseDestroyPolicy::AllScopeOnly && scope == DeploymentScope::Base {
      return Err(GuardError::BaseOnlyDestroyForbidden);
    }

    if token != Some(DESTROY_BASE_TOKEN) {
      return Err(GuardError::ConfirmationRequired { scope });
    }

    debug!(scope = %scope, "base destruction confirmed");
    Ok(())
  }

  /// Same rule for an explicit spec list: any base spec needs the token.
  pub fn authorize_specs(&self, action: Action, specs: &[ResourceSpec], token: Option<&str>) -> Result<(), GuardError> {
    let has_base = specs.iter().any(|s| s.scope() == ResourceScope::Base);
    let has_runtime = specs.iter().any(|s| s.scope() == ResourceScope::Runtime);

    let scope = match (has_base, has_runtime) {
      (true, true) => DeploymentScope::All,
      (true, false) => DeploymentScope::Base,
      (false, _) => return Ok(()),
    };
    self.authorize(action, scope, token)
  }
}
