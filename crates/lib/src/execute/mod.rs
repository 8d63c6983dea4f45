//! Lifecycle execution: create or destroy a resolved set of specs.
//!
//! This module provides the [`Executor`], which drives the provider wave by
//! wave. It handles:
//! - DAG-based ordering (reverse order for destroy)
//! - Parallel execution of independent specs within a wave
//! - Failure propagation and skip tracking, without rollback
//! - Saving every touched partition after each wave
//! - Cancellation between and inside waves

pub mod dag;
pub mod partitions;
pub mod retry;
pub mod types;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::catalog::{ResourceScope, ResourceSpec};
use crate::provider::{CreateRequest, DestroyRequest, ProviderHandle, ResourceProvider};
use crate::reference::ReferenceResolver;
use crate::state::{MaterializedResource, StoreError};

pub use dag::ExecutionDag;
pub use partitions::PartitionSet;
pub use retry::{RetryError, RetryPolicy};
pub use types::{
  Action, ApplyReport, ExecuteConfig, ExecuteError, ExecutorError, FailedSpec, SkipReason, SkippedSpec, SpecRef,
};

/// One unit of work handed to a worker task.
#[derive(Debug)]
enum Job {
  Create {
    spec: ResourceSpec,
    dependencies: BTreeMap<String, ProviderHandle>,
  },
  Refresh {
    spec: ResourceSpec,
    existing: MaterializedResource,
    dependencies: BTreeMap<String, ProviderHandle>,
  },
  Destroy {
    record: MaterializedResource,
  },
}

impl Job {
  fn target(&self) -> SpecRef {
    match self {
      Job::Create { spec, .. } | Job::Refresh { spec, .. } => SpecRef::new(&spec.id, spec.scope()),
      Job::Destroy { record } => SpecRef::new(&record.spec_id, record.scope),
    }
  }
}

/// One destroy step: orphaned records or catalog positions of one wave.
#[derive(Debug)]
enum DestroyStep {
  Orphans(Vec<MaterializedResource>),
  Wave(Vec<usize>),
}

#[derive(Debug)]
enum Outcome {
  Created(MaterializedResource),
  /// Live resource matches state.
  Unchanged,
  /// Live resource drifted; state is updated without a create.
  Refreshed(MaterializedResource),
  Destroyed(MaterializedResource),
}

/// Drives a [`ResourceProvider`] over a set of specs.
pub struct Executor {
  provider: Arc<dyn ResourceProvider>,
  config: ExecuteConfig,
}

impl Executor {
  pub fn new(provider: Arc<dyn ResourceProvider>, config: ExecuteConfig) -> Self {
    Self { provider, config }
  }

  pub fn config(&self) -> &ExecuteConfig {
    &self.config
  }

  /// Apply `action` to `specs`, reading and writing `partitions`.
  ///
  /// `specs` is expected in the order produced by [`crate::scope::resolve`].
  /// Every partition that changed is saved after each wave, so whatever
  /// succeeded is recorded even when the run ends in an error.
  pub async fn apply(
    &self,
    specs: &[ResourceSpec],
    action: Action,
    partitions: &mut PartitionSet,
  ) -> Result<ApplyReport, ExecutorError> {
    let dag = ExecutionDag::from_specs(specs)?;

    info!(
      action = %action,
      env = partitions.env(),
      specs = specs.len(),
      provider = self.provider.name(),
      "starting apply"
    );

    let mut report = ApplyReport::new(action);
    let outcome = match action {
      Action::Create => self.create(specs, &dag, partitions, &mut report).await,
      Action::Destroy => self.destroy(specs, &dag, partitions, &mut report).await,
    };
    let cancelled = match outcome {
      Ok(cancelled) => cancelled,
      Err(source) => {
        error!(error = %source, succeeded = report.succeeded.len(), "state write failed, stopping");
        return Err(ExecutorError::Store { source, report });
      }
    };

    info!(
      succeeded = report.succeeded.len(),
      unchanged = report.unchanged.len(),
      absent = report.absent.len(),
      failed = report.failed.len(),
      skipped = report.skipped.len(),
      "apply complete"
    );

    if cancelled {
      Err(ExecutorError::Cancelled { report })
    } else if !report.is_success() {
      Err(ExecutorError::PartialApply { report })
    } else {
      Ok(report)
    }
  }

  /// Create waves in dependency order. Returns whether the run was cancelled.
  async fn create(
    &self,
    specs: &[ResourceSpec],
    dag: &ExecutionDag,
    partitions: &mut PartitionSet,
    report: &mut ApplyReport,
  ) -> Result<bool, StoreError> {
    let waves = dag.waves();
    info!(wave_count = waves.len(), "computed create waves");

    let mut blocked: HashSet<String> = HashSet::new();
    let mut stop: Option<SkipReason> = None;

    for (wave_idx, wave) in waves.iter().enumerate() {
      if stop.is_none() && self.config.retry.cancel.is_cancelled() {
        stop = Some(SkipReason::Cancelled);
      }
      if let Some(reason) = &stop {
        for &pos in wave {
          let spec = &specs[pos];
          if partitions.get(spec.scope(), &spec.id).is_some() && !self.config.refresh {
            report.unchanged.push(SpecRef::new(&spec.id, spec.scope()));
          } else {
            report.skipped.push(SkippedSpec {
              id: spec.id.clone(),
              scope: spec.scope(),
              reason: reason.clone(),
            });
          }
        }
        continue;
      }

      debug!(wave = wave_idx, specs = wave.len(), "executing create wave");

      let mut jobs = Vec::new();
      for &pos in wave {
        let spec = &specs[pos];

        if let Some(dep) = dag.dependencies(&spec.id).into_iter().find(|d| blocked.contains(*d)) {
          warn!(spec = %spec.id, failed_dep = %dep, "skipping create due to failed dependency");
          report.skipped.push(SkippedSpec {
            id: spec.id.clone(),
            scope: spec.scope(),
            reason: SkipReason::Blocked(dep.to_string()),
          });
          blocked.insert(spec.id.clone());
          continue;
        }

        let existing = partitions.get(spec.scope(), &spec.id).cloned();
        match existing {
          Some(existing) if !self.config.refresh => {
            debug!(spec = %spec.id, handle = %existing.provider_handle, "already materialized");
            report.unchanged.push(SpecRef::new(&spec.id, spec.scope()));
          }
          Some(existing) => jobs.push(Job::Refresh {
            spec: spec.clone(),
            existing,
            dependencies: dependency_handles(spec, partitions),
          }),
          None => jobs.push(Job::Create {
            spec: spec.clone(),
            dependencies: dependency_handles(spec, partitions),
          }),
        }
      }

      let results = self.run_wave(jobs, partitions.env()).await;
      let folded = self.collect(results, partitions, report, &mut blocked);
      partitions.save_dirty()?;
      let cancelled = folded?;
      stop = self.stop_reason(cancelled, report);
    }

    Ok(matches!(stop, Some(SkipReason::Cancelled)))
  }

  /// Destroy in reverse dependency order. Returns whether the run was
  /// cancelled.
  ///
  /// Runtime goes first as a whole (its orphans, then its waves) since base
  /// never depends on runtime. Base orphans follow, then the base waves.
  async fn destroy(
    &self,
    specs: &[ResourceSpec],
    dag: &ExecutionDag,
    partitions: &mut PartitionSet,
    report: &mut ApplyReport,
  ) -> Result<bool, StoreError> {
    let known: HashSet<&str> = specs.iter().map(|s| s.id.as_str()).collect();
    let (base_orphans, runtime_orphans): (Vec<MaterializedResource>, Vec<MaterializedResource>) = partitions
      .states()
      .flat_map(|state| state.resources().iter())
      .filter(|record| !known.contains(record.spec_id.as_str()))
      .cloned()
      .partition(|record| record.scope == ResourceScope::Base);

    let mut steps = vec![DestroyStep::Orphans(runtime_orphans)];
    let mut base_steps = vec![DestroyStep::Orphans(base_orphans)];
    let mut waves = dag.waves();
    waves.reverse();
    for mut wave in waves {
      // Mirror of the create order, inside each wave too.
      wave.reverse();
      let (base, runtime): (Vec<usize>, Vec<usize>) =
        wave.into_iter().partition(|&pos| specs[pos].scope() == ResourceScope::Base);
      if !runtime.is_empty() {
        steps.push(DestroyStep::Wave(runtime));
      }
      if !base.is_empty() {
        base_steps.push(DestroyStep::Wave(base));
      }
    }
    steps.extend(base_steps);
    info!(step_count = steps.len(), "computed destroy steps");

    let mut blocked: HashSet<String> = HashSet::new();
    let mut stop: Option<SkipReason> = None;

    for (step_idx, step) in steps.into_iter().enumerate() {
      if stop.is_none() && self.config.retry.cancel.is_cancelled() {
        stop = Some(SkipReason::Cancelled);
      }

      let jobs: Vec<Job> = match step {
        DestroyStep::Orphans(orphans) => {
          if orphans.is_empty() {
            continue;
          }
          if let Some(reason) = &stop {
            skip_records(&orphans, reason, report);
            continue;
          }
          for orphan in &orphans {
            info!(spec = %orphan.spec_id, scope = %orphan.scope, "destroying orphaned resource");
          }
          orphans.into_iter().map(|record| Job::Destroy { record }).collect()
        }
        DestroyStep::Wave(wave) => {
          if let Some(reason) = &stop {
            let pending: Vec<MaterializedResource> = wave
              .iter()
              .filter_map(|&pos| partitions.get(specs[pos].scope(), &specs[pos].id).cloned())
              .collect();
            for &pos in &wave {
              if partitions.get(specs[pos].scope(), &specs[pos].id).is_none() {
                report.absent.push(SpecRef::new(&specs[pos].id, specs[pos].scope()));
              }
            }
            skip_records(&pending, reason, report);
            continue;
          }

          debug!(step = step_idx, specs = wave.len(), "executing destroy wave");

          let mut jobs = Vec::new();
          for &pos in &wave {
            let spec = &specs[pos];

            if let Some(dependent) = dag.dependents(&spec.id).into_iter().find(|d| blocked.contains(*d)) {
              warn!(spec = %spec.id, blocked_by = %dependent, "skipping destroy: a dependent was not destroyed");
              report.skipped.push(SkippedSpec {
                id: spec.id.clone(),
                scope: spec.scope(),
                reason: SkipReason::Blocked(dependent.to_string()),
              });
              blocked.insert(spec.id.clone());
              continue;
            }

            match partitions.get(spec.scope(), &spec.id) {
              Some(record) => jobs.push(Job::Destroy { record: record.clone() }),
              None => {
                debug!(spec = %spec.id, "nothing recorded, nothing to destroy");
                report.absent.push(SpecRef::new(&spec.id, spec.scope()));
              }
            }
          }
          jobs
        }
      };

      let results = self.run_wave(jobs, partitions.env()).await;
      let folded = self.collect(results, partitions, report, &mut blocked);
      partitions.save_dirty()?;
      let cancelled = folded?;
      stop = self.stop_reason(cancelled, report);
    }

    Ok(matches!(stop, Some(SkipReason::Cancelled)))
  }

  fn stop_reason(&self, cancelled: bool, report: &ApplyReport) -> Option<SkipReason> {
    if cancelled {
      return Some(SkipReason::Cancelled);
    }
    if self.config.fail_fast
      && let Some(first) = report.failed.first()
    {
      warn!(spec = %first.id, "fail-fast: not starting further waves");
      return Some(SkipReason::Stopped(first.id.clone()));
    }
    None
  }

  /// Fold wave results into the report and the partitions. Returns whether
  /// any job observed cancellation.
  fn collect(
    &self,
    results: Vec<(SpecRef, Result<Outcome, ExecuteError>)>,
    partitions: &mut PartitionSet,
    report: &mut ApplyReport,
    blocked: &mut HashSet<String>,
  ) -> Result<bool, StoreError> {
    let mut cancelled = false;
    let mut store_error: Option<StoreError> = None;

    for (target, result) in results {
      match result {
        Ok(Outcome::Created(resource)) => {
          info!(spec = %target.id, scope = %target.scope, handle = %resource.provider_handle, "created");
          report.succeeded.push(resource.clone());
          if let Err(e) = partitions.record(resource) {
            store_error = store_error.or(Some(e));
          }
        }
        Ok(Outcome::Refreshed(resource)) => {
          info!(spec = %target.id, scope = %target.scope, "refreshed drifted record");
          report.unchanged.push(target);
          if let Err(e) = partitions.record(resource) {
            store_error = store_error.or(Some(e));
          }
        }
        Ok(Outcome::Unchanged) => report.unchanged.push(target),
        Ok(Outcome::Destroyed(record)) => {
          info!(spec = %target.id, scope = %target.scope, handle = %record.provider_handle, "destroyed");
          partitions.remove(record.scope, &record.spec_id);
          report.succeeded.push(record);
        }
        Err(ExecuteError::Cancelled) => {
          debug!(spec = %target.id, "not started: cancelled");
          cancelled = true;
          blocked.insert(target.id.clone());
          report.skipped.push(SkippedSpec {
            id: target.id,
            scope: target.scope,
            reason: SkipReason::Cancelled,
          });
        }
        Err(e) => {
          error!(spec = %target.id, scope = %target.scope, error = %e, "spec failed");
          blocked.insert(target.id.clone());
          report.failed.push(FailedSpec {
            id: target.id,
            scope: target.scope,
            error: e,
          });
        }
      }
    }

    match store_error {
      Some(e) => Err(e),
      None => Ok(cancelled),
    }
  }

  /// Run one wave of jobs concurrently, bounded by `parallelism`.
  ///
  /// Results come back in job order regardless of completion order.
  async fn run_wave(&self, jobs: Vec<Job>, env: &str) -> Vec<(SpecRef, Result<Outcome, ExecuteError>)> {
    if jobs.is_empty() {
      return Vec::new();
    }

    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
    let targets: Vec<SpecRef> = jobs.iter().map(Job::target).collect();
    let mut join_set = JoinSet::new();

    for (idx, job) in jobs.into_iter().enumerate() {
      let provider = self.provider.clone();
      let retry = self.config.retry.clone();
      let env = env.to_string();
      let semaphore = semaphore.clone();

      join_set.spawn(async move {
        // Acquire semaphore permit inside the task
        let result = match semaphore.acquire_owned().await {
          Ok(_permit) => run_job(job, provider.as_ref(), &retry, &env).await,
          Err(_) => Err(ExecuteError::Cancelled),
        };
        (idx, result)
      });
    }

    let mut slots: Vec<Option<Result<Outcome, ExecuteError>>> = targets.iter().map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok((idx, result)) => slots[idx] = Some(result),
        Err(e) => error!(error = %e, "execution task panicked"),
      }
    }

    targets
      .into_iter()
      .zip(slots)
      .map(|(target, slot)| {
        let result = slot.unwrap_or_else(|| Err(ExecuteError::TaskFailed(format!("no result for '{}'", target.id))));
        (target, result)
      })
      .collect()
  }
}

async fn run_job(
  job: Job,
  provider: &dyn ResourceProvider,
  retry: &RetryPolicy,
  env: &str,
) -> Result<Outcome, ExecuteError> {
  match job {
    Job::Create { spec, dependencies } => create_one(&spec, dependencies, provider, retry, env)
      .await
      .map(Outcome::Created),

    Job::Refresh {
      spec,
      existing,
      dependencies,
    } => {
      let live = retry
        .run(&format!("describe {}", spec.id), || provider.describe(&existing.provider_handle))
        .await?;

      match live {
        Some(item) if item.tags == existing.tags && item.kind == existing.kind => Ok(Outcome::Unchanged),
        Some(item) => Ok(Outcome::Refreshed(MaterializedResource {
          kind: item.kind,
          tags: item.tags,
          ..existing
        })),
        None => {
          warn!(spec = %spec.id, handle = %existing.provider_handle, "resource is gone, recreating");
          create_one(&spec, dependencies, provider, retry, env)
            .await
            .map(Outcome::Created)
        }
      }
    }

    Job::Destroy { record } => {
      let request = DestroyRequest {
        spec_id: record.spec_id.clone(),
        kind: record.kind.clone(),
        scope: record.scope,
        env: env.to_string(),
        handle: record.provider_handle.clone(),
      };

      match retry
        .run(&format!("destroy {}", record.spec_id), || provider.destroy(&request))
        .await
      {
        Ok(()) => Ok(Outcome::Destroyed(record)),
        Err(RetryError::Failed { source, .. }) if source.is_not_found() => {
          debug!(spec = %record.spec_id, handle = %record.provider_handle, "already gone");
          Ok(Outcome::Destroyed(record))
        }
        Err(e) => Err(e.into()),
      }
    }
  }
}

async fn create_one(
  spec: &ResourceSpec,
  dependencies: BTreeMap<String, ProviderHandle>,
  provider: &dyn ResourceProvider,
  retry: &RetryPolicy,
  env: &str,
) -> Result<MaterializedResource, ExecuteError> {
  let references = ReferenceResolver::new(provider, retry, env).resolve(spec).await?;

  let mut request = CreateRequest::for_spec(spec, env);
  request.dependencies = dependencies;
  request.references = references;

  let handle = retry
    .run(&format!("create {}", spec.id), || provider.create(&request))
    .await?;

  Ok(MaterializedResource {
    spec_id: spec.id.clone(),
    provider_handle: handle,
    created_at: Utc::now(),
    scope: spec.scope(),
    kind: spec.kind.clone(),
    tags: request.tags,
  })
}

/// Handles of the spec's declared dependencies that are recorded in a held partition.
fn dependency_handles(spec: &ResourceSpec, partitions: &PartitionSet) -> BTreeMap<String, ProviderHandle> {
  spec
    .depends_on
    .iter()
    .filter_map(|dep| partitions.find(dep).map(|r| (dep.clone(), r.provider_handle.clone())))
    .collect()
}

fn skip_records(records: &[MaterializedResource], reason: &SkipReason, report: &mut ApplyReport) {
  for record in records {
    report.skipped.push(SkippedSpec {
      id: record.spec_id.clone(),
      scope: record.scope,
      reason: reason.clone(),
    });
  }
}
