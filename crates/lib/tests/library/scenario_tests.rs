use std::collections::BTreeMap;
use std::sync::Arc;

use scopedeploy_lib::consts::DESTROY_BASE_TOKEN;
use scopedeploy_lib::deploy::exit_code;
use scopedeploy_lib::execute::{Action, ExecuteError, ExecutorError};
use scopedeploy_lib::guard::GuardError;
use scopedeploy_lib::provider::{MemoryProvider, ProviderError};
use scopedeploy_lib::reference::{LookupError, ReferenceError};
use scopedeploy_lib::scope::DeploymentScope;
use scopedeploy_lib::{DeployError, DeployRequest};
use tempfile::TempDir;

use super::common::{SCENARIO_CATALOG, deployer};

fn confirmed(scope: DeploymentScope) -> DeployRequest {
  DeployRequest {
    confirm: Some(DESTROY_BASE_TOKEN.to_string()),
    ..DeployRequest::new(scope)
  }
}

#[tokio::test]
async fn failed_subnet_keeps_created_vpc() {
  let temp = TempDir::new().unwrap();
  let provider = Arc::new(MemoryProvider::new());
  provider.fail_create("subnet", ProviderError::Rejected("cidr overlaps".into()));
  let deployer = deployer(temp.path(), SCENARIO_CATALOG, provider.clone());

  let err = deployer.up(&DeployRequest::new(DeploymentScope::Base)).await.unwrap_err();

  let DeployError::Executor(ExecutorError::PartialApply { report }) = &err else {
    panic!("expected PartialApply, got {err:?}");
  };
  assert_eq!(report.succeeded_ids(), vec!["vpc"]);
  assert_eq!(report.failed_ids(), vec!["subnet"]);
  assert_eq!(err.exit_code(), exit_code::FAILURE);

  let status = deployer.status().await.unwrap();
  let base: Vec<&str> = status[0].resources().iter().map(|r| r.spec_id.as_str()).collect();
  assert_eq!(base, vec!["vpc"]);
  assert!(status[1].is_empty());
}

#[tokio::test]
async fn rerun_after_failure_only_creates_the_rest() {
  let temp = TempDir::new().unwrap();
  let provider = Arc::new(MemoryProvider::new());
  provider.fail_create("subnet", ProviderError::Rejected("cidr overlaps".into()));
  let deployer = deployer(temp.path(), SCENARIO_CATALOG, provider.clone());
  let request = DeployRequest::new(DeploymentScope::Base);

  deployer.up(&request).await.unwrap_err();
  provider.clear_faults();
  provider.reset_calls();

  let report = deployer.up(&request).await.unwrap();
  assert_eq!(report.succeeded_ids(), vec!["subnet"]);
  assert_eq!(report.unchanged.len(), 1);
  assert_eq!(provider.calls().create, 1);
}

#[tokio::test]
async fn second_up_issues_no_provider_calls() {
  let temp = TempDir::new().unwrap();
  let provider = Arc::new(MemoryProvider::new());
  let deployer = deployer(temp.path(), SCENARIO_CATALOG, provider.clone());
  let request = DeployRequest::new(DeploymentScope::All);

  deployer.up(&request).await.unwrap();
  let before = deployer.status().await.unwrap();
  provider.reset_calls();

  let report = deployer.up(&request).await.unwrap();

  assert_eq!(provider.calls().total(), 0);
  assert!(report.succeeded.is_empty());
  assert_eq!(report.unchanged.len(), 4);
  let after = deployer.status().await.unwrap();
  assert_eq!(
    before.iter().map(|s| s.resources().to_vec()).collect::<Vec<_>>(),
    after.iter().map(|s| s.resources().to_vec()).collect::<Vec<_>>()
  );
}

#[tokio::test]
async fn base_down_requires_token_and_leaves_state_alone() {
  let temp = TempDir::new().unwrap();
  let provider = Arc::new(MemoryProvider::new());
  let deployer = deployer(temp.path(), SCENARIO_CATALOG, provider.clone());
  deployer.up(&DeployRequest::new(DeploymentScope::Base)).await.unwrap();
  provider.reset_calls();

  for scope in [DeploymentScope::Base, DeploymentScope::All] {
    let err = deployer.down(&DeployRequest::new(scope)).await.unwrap_err();
    assert!(matches!(err, DeployError::Guard(GuardError::ConfirmationRequired { .. })));
    assert_eq!(err.exit_code(), exit_code::CONFIRMATION_REQUIRED);
  }

  assert_eq!(provider.calls().total(), 0);
  assert_eq!(deployer.status().await.unwrap()[0].len(), 2);
}

#[tokio::test]
async fn runtime_lifecycle_leaves_base_untouched() {
  let temp = TempDir::new().unwrap();
  let provider = Arc::new(MemoryProvider::new());
  let deployer = deployer(temp.path(), SCENARIO_CATALOG, provider.clone());

  deployer.up(&DeployRequest::new(DeploymentScope::Base)).await.unwrap();
  let base_before = deployer.status().await.unwrap()[0].clone();

  deployer.up(&DeployRequest::new(DeploymentScope::Runtime)).await.unwrap();
  let report = deployer.down(&DeployRequest::new(DeploymentScope::Runtime)).await.unwrap();
  let destroyed: Vec<&str> = report.succeeded.iter().map(|r| r.spec_id.as_str()).collect();
  assert_eq!(destroyed, vec!["ecs_service", "ecs_cluster"]);

  let status = deployer.status().await.unwrap();
  assert_eq!(status[0], base_before);
  assert!(status[1].is_empty());
  assert_eq!(provider.items().len(), 2);
}

#[tokio::test]
async fn service_receives_base_vpc_through_reference() {
  let temp = TempDir::new().unwrap();
  let provider = Arc::new(MemoryProvider::new());
  let deployer = deployer(temp.path(), SCENARIO_CATALOG, provider.clone());

  deployer.up(&DeployRequest::new(DeploymentScope::Base)).await.unwrap();
  deployer.up(&DeployRequest::new(DeploymentScope::Runtime)).await.unwrap();

  let service = provider
    .items()
    .into_iter()
    .find(|item| item.tags.get("SpecId").map(String::as_str) == Some("ecs_service"))
    .unwrap();
  assert_eq!(service.tags["Scope"], "runtime");
  assert_eq!(service.tags["Environment"], "dev");
  assert_eq!(service.tags["ManagedBy"], "scopedeploy");
}

#[tokio::test]
async fn base_can_be_recreated_without_touching_runtime_specs() {
  let temp = TempDir::new().unwrap();
  let provider = Arc::new(MemoryProvider::new());
  let deployer = deployer(temp.path(), SCENARIO_CATALOG, provider.clone());

  deployer.up(&DeployRequest::new(DeploymentScope::Base)).await.unwrap();
  let old_vpc = deployer.status().await.unwrap()[0].get("vpc").unwrap().provider_handle.clone();

  deployer.down(&confirmed(DeploymentScope::Base)).await.unwrap();
  deployer.up(&DeployRequest::new(DeploymentScope::Base)).await.unwrap();
  let new_vpc = deployer.status().await.unwrap()[0].get("vpc").unwrap().provider_handle.clone();
  assert_ne!(old_vpc, new_vpc);

  let report = deployer.up(&DeployRequest::new(DeploymentScope::Runtime)).await.unwrap();
  assert_eq!(report.succeeded_ids(), vec!["ecs_cluster", "ecs_service"]);
}

#[tokio::test]
async fn ambiguous_reference_fails_the_service_only() {
  let temp = TempDir::new().unwrap();
  let provider = Arc::new(MemoryProvider::new());
  let deployer = deployer(temp.path(), SCENARIO_CATALOG, provider.clone());
  deployer.up(&DeployRequest::new(DeploymentScope::Base)).await.unwrap();

  let tags: BTreeMap<String, String> = [("Environment", "dev"), ("Scope", "base"), ("Type", "networking")]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
  provider.seed("aws_vpc", tags);

  let err = deployer.up(&DeployRequest::new(DeploymentScope::Runtime)).await.unwrap_err();
  let report = err.report().unwrap();
  assert_eq!(report.succeeded_ids(), vec!["ecs_cluster"]);
  assert!(matches!(
    report.failed[0].error,
    ExecuteError::Reference(ReferenceError::Lookup {
      source: LookupError::Ambiguous { .. },
      ..
    })
  ));
}

#[tokio::test]
async fn plan_reflects_state_without_provider_calls() {
  let temp = TempDir::new().unwrap();
  let provider = Arc::new(MemoryProvider::new());
  let deployer = deployer(temp.path(), SCENARIO_CATALOG, provider.clone());
  deployer.up(&DeployRequest::new(DeploymentScope::Base)).await.unwrap();
  provider.reset_calls();

  let create = deployer.plan(Action::Create, DeploymentScope::All).await.unwrap();
  let to_create: Vec<&str> = create.to_create.iter().map(|e| e.id.as_str()).collect();
  assert_eq!(to_create, vec!["ecs_cluster", "ecs_service"]);
  assert_eq!(create.unchanged.len(), 2);

  let destroy = deployer.plan(Action::Destroy, DeploymentScope::Base).await.unwrap();
  let to_destroy: Vec<&str> = destroy.to_destroy.iter().map(|e| e.id.as_str()).collect();
  assert_eq!(to_destroy, vec!["subnet", "vpc"]);

  assert_eq!(provider.calls().total(), 0);
}

#[tokio::test]
async fn cycle_is_rejected_before_any_call() {
  let temp = TempDir::new().unwrap();
  let provider = Arc::new(MemoryProvider::new());
  let catalog = r#"
[[resource]]
id = "a"
scope = "runtime"
kind = "test"
depends_on = ["b"]

[[resource]]
id = "b"
scope = "runtime"
kind = "test"
depends_on = ["a"]
"#;
  let deployer = deployer(temp.path(), catalog, provider.clone());

  let err = deployer.up(&DeployRequest::new(DeploymentScope::Runtime)).await.unwrap_err();
  assert_eq!(err.exit_code(), exit_code::INVALID_INPUT);
  assert_eq!(provider.calls().total(), 0);
  assert!(!temp.path().join("state").exists());
}
