use std::sync::Arc;
use std::time::Duration;

use scopedeploy_lib::deploy::exit_code;
use scopedeploy_lib::execute::{ExecutorError, SkipReason};
use scopedeploy_lib::provider::MemoryProvider;
use scopedeploy_lib::scope::DeploymentScope;
use scopedeploy_lib::state::StoreError;
use scopedeploy_lib::{DeployError, DeployRequest};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::common::{SCENARIO_CATALOG, deployer, deployer_with_timeout};

const RUNTIME_ONLY: &str = r#"
[[resource]]
id = "ecs_cluster"
scope = "runtime"
kind = "aws_ecs_cluster"
"#;

const BASE_CHAIN: &str = r#"
[[resource]]
id = "vpc"
scope = "base"
kind = "aws_vpc"

[[resource]]
id = "subnet"
scope = "base"
kind = "aws_subnet"
depends_on = ["vpc"]

[[resource]]
id = "route_table"
scope = "base"
kind = "aws_route_table"
depends_on = ["subnet"]
"#;

async fn wait_until(mut condition: impl FnMut() -> bool) {
  for _ in 0..200 {
    if condition() {
      return;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  panic!("condition not reached");
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_runtime_applies_contend_then_see_committed_state() {
  let temp = TempDir::new().unwrap();
  let provider = Arc::new(MemoryProvider::new().with_latency(Duration::from_millis(300)));
  let first = Arc::new(deployer_with_timeout(temp.path(), RUNTIME_ONLY, provider.clone(), 10));
  let second = deployer(temp.path(), RUNTIME_ONLY, provider.clone());

  let running = {
    let first = first.clone();
    tokio::spawn(async move { first.up(&DeployRequest::new(DeploymentScope::Runtime)).await })
  };

  let lock_file = temp.path().join("state").join("runtime").join("dev.lock");
  wait_until(|| lock_file.exists()).await;
  tokio::time::sleep(Duration::from_millis(50)).await;

  let err = second.up(&DeployRequest::new(DeploymentScope::Runtime)).await.unwrap_err();
  let DeployError::Store(StoreError::LockContention { partition, holder, .. }) = &err else {
    panic!("expected LockContention, got {err:?}");
  };
  assert_eq!(partition.to_string(), "runtime/dev");
  assert!(holder.as_ref().unwrap().command.contains("--scope=runtime"));
  assert_eq!(err.exit_code(), exit_code::FAILURE);

  running.await.unwrap().unwrap();

  let report = second.up(&DeployRequest::new(DeploymentScope::Runtime)).await.unwrap();
  assert!(report.succeeded.is_empty());
  assert_eq!(report.unchanged.len(), 1);
  assert_eq!(provider.calls().create, 1);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn base_and_runtime_partitions_do_not_block_each_other() {
  let temp = TempDir::new().unwrap();
  let provider = Arc::new(MemoryProvider::new().with_latency(Duration::from_millis(300)));
  let base = Arc::new(deployer_with_timeout(temp.path(), BASE_CHAIN, provider.clone(), 10));
  let runtime = deployer(temp.path(), RUNTIME_ONLY, provider.clone());

  let running = {
    let base = base.clone();
    tokio::spawn(async move { base.up(&DeployRequest::new(DeploymentScope::Base)).await })
  };

  let lock_file = temp.path().join("state").join("base").join("dev.lock");
  wait_until(|| lock_file.exists()).await;
  tokio::time::sleep(Duration::from_millis(50)).await;

  // Zero lock wait: succeeds only because runtime/dev is a separate lock.
  runtime.up(&DeployRequest::new(DeploymentScope::Runtime)).await.unwrap();
  running.await.unwrap().unwrap();
}

#[tokio::test]
async fn cancelled_before_start_issues_no_calls() {
  let temp = TempDir::new().unwrap();
  let provider = Arc::new(MemoryProvider::new());
  let cancel = CancellationToken::new();
  cancel.cancel();
  let deployer = deployer(temp.path(), SCENARIO_CATALOG, provider.clone()).with_cancellation(cancel);

  let err = deployer.up(&DeployRequest::new(DeploymentScope::Base)).await.unwrap_err();

  let DeployError::Executor(ExecutorError::Cancelled { report }) = &err else {
    panic!("expected Cancelled, got {err:?}");
  };
  assert!(report.skipped.iter().all(|s| s.reason == SkipReason::Cancelled));
  assert_eq!(report.skipped.len(), 2);
  assert_eq!(provider.calls().total(), 0);
  assert_eq!(err.exit_code(), exit_code::FAILURE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_mid_run_persists_what_was_created() {
  let temp = TempDir::new().unwrap();
  let provider = Arc::new(MemoryProvider::new().with_latency(Duration::from_millis(100)));
  let cancel = CancellationToken::new();
  let deployer = Arc::new(deployer(temp.path(), BASE_CHAIN, provider.clone()).with_cancellation(cancel.clone()));

  let running = {
    let deployer = deployer.clone();
    tokio::spawn(async move { deployer.up(&DeployRequest::new(DeploymentScope::Base)).await })
  };

  wait_until(|| provider.created_order().contains(&"vpc".to_string())).await;
  cancel.cancel();

  let err = running.await.unwrap().unwrap_err();
  assert!(matches!(err, DeployError::Executor(ExecutorError::Cancelled { .. })));

  let status = deployer.status().await.unwrap();
  let recorded = &status[0];
  assert!(recorded.contains("vpc"));
  assert!(!recorded.contains("route_table"));
  // Nothing created by the provider is missing from state.
  assert_eq!(recorded.len(), provider.items().len());
}
