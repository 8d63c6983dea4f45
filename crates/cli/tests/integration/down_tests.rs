//! Down command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

fn destroyed(report: &serde_json::Value) -> Vec<String> {
  report["succeeded"]
    .as_array()
    .unwrap()
    .iter()
    .map(|r| r["spec_id"].as_str().unwrap().to_string())
    .collect()
}

#[test]
fn base_down_without_token_is_refused() {
  let env = TestEnv::new();
  env.up("base", "dev");

  env
    .deploy_cmd()
    .args(["down", "--scope", "base", "--env", "dev", "--auto-approve"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("--confirm=destroy-base"));

  assert_eq!(env.inventory_len("dev"), 2);
}

#[test]
fn all_down_without_token_is_refused() {
  let env = TestEnv::new();
  env.up("all", "dev");

  env
    .deploy_cmd()
    .args(["down", "--scope", "all", "--env", "dev", "--auto-approve"])
    .assert()
    .code(2);

  assert_eq!(env.inventory_len("dev"), 4);
}

#[test]
fn wrong_token_is_refused() {
  let env = TestEnv::new();

  env
    .deploy_cmd()
    .args(["down", "--scope", "base", "--env", "dev", "--confirm", "yes", "--auto-approve"])
    .assert()
    .code(2);
}

#[test]
fn runtime_down_needs_no_token_and_keeps_base() {
  let env = TestEnv::new();
  env.up("all", "dev");

  let report = env.json(&["down", "--scope", "runtime", "--env", "dev", "--auto-approve"]);

  assert_eq!(destroyed(&report), vec!["ecs_service", "ecs_cluster"]);
  assert_eq!(env.inventory_len("dev"), 2);
}

#[test]
fn runtime_cycles_against_stable_base() {
  let env = TestEnv::new();
  env.up("base", "dev");
  let base_before = env.inventory("dev");

  for _ in 0..2 {
    env.up("runtime", "dev");
    env
      .deploy_cmd()
      .args(["down", "--scope", "runtime", "--env", "dev", "--auto-approve"])
      .assert()
      .success();
  }

  assert_eq!(env.inventory("dev")["items"], base_before["items"]);
}

#[test]
fn all_down_with_token_destroys_in_reverse_order() {
  let env = TestEnv::new();
  env.up("all", "dev");

  let report = env.json(&[
    "down",
    "--scope",
    "all",
    "--env",
    "dev",
    "--confirm",
    "destroy-base",
    "--auto-approve",
  ]);

  assert_eq!(report["action"], "destroy");
  assert_eq!(destroyed(&report), vec!["ecs_service", "ecs_cluster", "subnet", "vpc"]);
  assert_eq!(env.inventory_len("dev"), 0);
}

#[test]
fn down_with_nothing_deployed_succeeds() {
  let env = TestEnv::new();

  env
    .deploy_cmd()
    .args(["down", "--scope", "runtime", "--env", "dev"])
    .assert()
    .success()
    .stdout(predicate::str::contains("0 to destroy"));
}

#[test]
fn non_interactive_down_requires_auto_approve() {
  let env = TestEnv::new();
  env.up("base", "dev");

  env
    .deploy_cmd()
    .args(["down", "--scope", "base", "--env", "dev", "--confirm", "destroy-base"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("--auto-approve"));

  assert_eq!(env.inventory_len("dev"), 2);
}
