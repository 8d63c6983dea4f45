//! Types for lifecycle execution.
//!
//! This module defines the configuration, per-spec errors, the apply report
//! and the run-level errors returned by the executor.

use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::catalog::ResourceScope;
use crate::provider::ProviderError;
use crate::reference::ReferenceError;
use crate::scope::ResolveError;
use crate::state::{MaterializedResource, StoreError};

use super::retry::{RetryError, RetryPolicy};

/// What a run does to the selected specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
  Create,
  Destroy,
}

impl Action {
  pub fn as_str(self) -> &'static str {
    match self {
      Action::Create => "create",
      Action::Destroy => "destroy",
    }
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Why a single spec could not be created or destroyed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecuteError {
  /// The provider call failed fatally or ran out of retries.
  #[error("provider error after {attempts} attempt(s): {source}")]
  Provider {
    attempts: u32,
    #[source]
    source: ProviderError,
  },

  /// A cross-scope reference could not be resolved.
  #[error(transparent)]
  Reference(ReferenceError),

  /// The run was cancelled before the call could start.
  #[error("cancelled")]
  Cancelled,

  /// The worker task died without reporting a result.
  #[error("execution task failed: {0}")]
  TaskFailed(String),
}

impl From<RetryError> for ExecuteError {
  fn from(err: RetryError) -> Self {
    match err {
      RetryError::Cancelled => ExecuteError::Cancelled,
      RetryError::Failed { attempts, source } => ExecuteError::Provider { attempts, source },
    }
  }
}

impl From<ReferenceError> for ExecuteError {
  fn from(err: ReferenceError) -> Self {
    match err {
      ReferenceError::Cancelled { .. } => ExecuteError::Cancelled,
      other => ExecuteError::Reference(other),
    }
  }
}

/// A spec named by id and lifecycle group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecRef {
  pub id: String,
  pub scope: ResourceScope,
}

impl SpecRef {
  pub fn new(id: impl Into<String>, scope: ResourceScope) -> Self {
    Self { id: id.into(), scope }
  }
}

impl fmt::Display for SpecRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.id, self.scope)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedSpec {
  pub id: String,
  pub scope: ResourceScope,
  #[serde(serialize_with = "serialize_display")]
  pub error: ExecuteError,
}

/// Why a spec was never attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "spec", rename_all = "snake_case")]
pub enum SkipReason {
  /// A spec it is ordered after failed or was skipped itself.
  Blocked(String),
  /// `fail_fast` stopped the run after this spec failed.
  Stopped(String),
  Cancelled,
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SkipReason::Blocked(id) => write!(f, "blocked by '{}'", id),
      SkipReason::Stopped(id) => write!(f, "run stopped after '{}' failed", id),
      SkipReason::Cancelled => f.write_str("cancelled"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSpec {
  pub id: String,
  pub scope: ResourceScope,
  pub reason: SkipReason,
}

/// Outcome of one apply, naming every spec it looked at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
  pub action: Action,
  /// Resources created (or destroyed, for `Destroy`) by this run.
  pub succeeded: Vec<MaterializedResource>,
  /// Already materialized; nothing to do.
  pub unchanged: Vec<SpecRef>,
  /// Nothing recorded to destroy.
  pub absent: Vec<SpecRef>,
  pub failed: Vec<FailedSpec>,
  pub skipped: Vec<SkippedSpec>,
}

impl ApplyReport {
  pub fn new(action: Action) -> Self {
    Self {
      action,
      succeeded: Vec::new(),
      unchanged: Vec::new(),
      absent: Vec::new(),
      failed: Vec::new(),
      skipped: Vec::new(),
    }
  }

  /// Returns true if nothing failed or was skipped.
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty()
  }

  pub fn succeeded_ids(&self) -> Vec<&str> {
    self.succeeded.iter().map(|r| r.spec_id.as_str()).collect()
  }

  pub fn failed_ids(&self) -> Vec<&str> {
    self.failed.iter().map(|f| f.id.as_str()).collect()
  }

  pub fn skipped_ids(&self) -> Vec<&str> {
    self.skipped.iter().map(|s| s.id.as_str()).collect()
  }

  /// Returns the total number of specs processed.
  pub fn total(&self) -> usize {
    self.succeeded.len() + self.unchanged.len() + self.absent.len() + self.failed.len() + self.skipped.len()
  }
}

impl fmt::Display for ApplyReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}: {} succeeded, {} unchanged, {} absent, {} failed, {} skipped",
      self.action,
      self.succeeded.len(),
      self.unchanged.len(),
      self.absent.len(),
      self.failed.len(),
      self.skipped.len()
    )
  }
}

/// Errors that end an apply as a whole.
#[derive(Debug, Error)]
pub enum ExecutorError {
  /// Some specs failed or were skipped. Whatever succeeded has been saved.
  #[error(
    "{} incomplete ({} failed, {} skipped){}",
    .report.action,
    .report.failed.len(),
    .report.skipped.len(),
    .report.failed.iter().map(|f| format!("\n  {} ({}): {}", f.id, f.scope, f.error)).collect::<String>()
  )]
  PartialApply { report: ApplyReport },

  /// The run was cancelled. Partial results have been saved.
  #[error("{} cancelled after {} resource(s) succeeded", .report.action, .report.succeeded.len())]
  Cancelled { report: ApplyReport },

  /// State could not be written. The report names everything the provider
  /// already did, saved or not.
  #[error("{source}\n  {report}")]
  Store { source: StoreError, report: ApplyReport },

  #[error(transparent)]
  Dag(#[from] ResolveError),
}

impl ExecutorError {
  /// The report carried by the error, if the run got far enough to have one.
  pub fn report(&self) -> Option<&ApplyReport> {
    match self {
      ExecutorError::PartialApply { report }
      | ExecutorError::Cancelled { report }
      | ExecutorError::Store { report, .. } => Some(report),
      ExecutorError::Dag(_) => None,
    }
  }
}

/// Configuration for lifecycle execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of provider calls in flight within a wave.
  pub parallelism: usize,

  /// Stop starting new waves after the first failure.
  pub fail_fast: bool,

  /// Describe already materialized resources instead of trusting state.
  pub refresh: bool,

  /// Backoff, per-call timeout and cancellation for provider calls.
  pub retry: RetryPolicy,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: 4,
      fail_fast: false,
      refresh: false,
      retry: RetryPolicy::default(),
    }
  }
}

fn serialize_display<T: fmt::Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.collect_str(value)
}
