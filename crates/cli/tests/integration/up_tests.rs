//! Up command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

fn spec_ids(report: &serde_json::Value, field: &str) -> Vec<String> {
  report[field]
    .as_array()
    .unwrap()
    .iter()
    .map(|r| {
      r.get("spec_id")
        .or_else(|| r.get("id"))
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string()
    })
    .collect()
}

#[test]
fn up_base_creates_in_dependency_order() {
  let env = TestEnv::new();

  let report = env.json(&["up", "--scope", "base", "--env", "dev", "--auto-approve"]);

  assert_eq!(report["action"], "create");
  assert_eq!(spec_ids(&report, "succeeded"), vec!["vpc", "subnet"]);
  assert_eq!(env.inventory_len("dev"), 2);
  assert!(env.state_path().join("base").join("dev.json").exists());
  assert!(!env.state_path().join("runtime").join("dev.json").exists());
}

#[test]
fn second_up_changes_nothing() {
  let env = TestEnv::new();
  env.up("base", "dev");

  env
    .deploy_cmd()
    .args(["up", "--scope", "base", "--env", "dev", "--auto-approve"])
    .assert()
    .success()
    .stdout(predicate::str::contains("0 to create, 2 unchanged"));

  assert_eq!(env.inventory_len("dev"), 2);
}

#[test]
fn runtime_before_base_fails_with_lookup_hint() {
  let env = TestEnv::new();

  env
    .deploy_cmd()
    .args(["up", "--scope", "runtime", "--env", "dev", "--auto-approve"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("create incomplete (1 failed, 1 skipped)"))
    .stderr(predicate::str::contains("run a base deployment"));

  assert_eq!(env.inventory_len("dev"), 0);
}

#[test]
fn runtime_after_base_resolves_reference_across_runs() {
  let env = TestEnv::new();
  env.up("base", "dev");

  let report = env.json(&["up", "--scope", "runtime", "--env", "dev", "--auto-approve"]);

  assert_eq!(spec_ids(&report, "succeeded"), vec!["ecs_cluster", "ecs_service"]);
  assert_eq!(env.inventory_len("dev"), 4);
  assert!(env.state_path().join("runtime").join("dev.json").exists());
}

#[test]
fn non_interactive_up_requires_auto_approve() {
  let env = TestEnv::new();

  env
    .deploy_cmd()
    .args(["up", "--scope", "base", "--env", "dev"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("--auto-approve"));

  assert_eq!(env.inventory_len("dev"), 0);
}

#[test]
fn unknown_environment_fails() {
  let env = TestEnv::new();

  env
    .deploy_cmd()
    .args(["up", "--scope", "base", "--env", "staging", "--auto-approve"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("unknown environment 'staging'"));
}

#[test]
fn environments_are_isolated() {
  let env = TestEnv::new();
  env.up("all", "dev");

  assert_eq!(env.inventory_len("dev"), 4);
  assert_eq!(env.inventory_len("prod"), 0);

  env.up("base", "prod");
  assert_eq!(env.inventory_len("prod"), 2);
  assert_eq!(env.inventory_len("dev"), 4);
}

#[test]
fn dependency_cycle_is_invalid_input() {
  let env = TestEnv::with_catalog(
    r#"
[[resource]]
id = "a"
scope = "base"
kind = "test"
depends_on = ["b"]

[[resource]]
id = "b"
scope = "base"
kind = "test"
depends_on = ["a"]
"#,
  );

  env
    .deploy_cmd()
    .args(["up", "--scope", "base", "--env", "dev", "--auto-approve"])
    .assert()
    .code(3)
    .stderr(predicate::str::contains("dependency cycle detected between: a, b"));

  assert_eq!(env.inventory_len("dev"), 0);
}

#[test]
fn base_depending_on_runtime_is_invalid_input() {
  let env = TestEnv::with_catalog(
    r#"
[[resource]]
id = "cluster"
scope = "runtime"
kind = "aws_ecs_cluster"

[[resource]]
id = "vpc"
scope = "base"
kind = "aws_vpc"
depends_on = ["cluster"]
"#,
  );

  env
    .deploy_cmd()
    .args(["up", "--scope", "all", "--env", "dev", "--auto-approve"])
    .assert()
    .code(3)
    .stderr(predicate::str::contains("base resource 'vpc' depends on runtime resource 'cluster'"));
}

#[test]
fn explicit_catalog_flag_overrides_config() {
  let env = TestEnv::new();
  env.write_file(
    "other.toml",
    r#"
[[resource]]
id = "zone"
scope = "base"
kind = "aws_route53_zone"
"#,
  );

  let report = env.json(&[
    "--catalog",
    "other.toml",
    "up",
    "--scope",
    "base",
    "--env",
    "dev",
    "--auto-approve",
  ]);

  assert_eq!(spec_ids(&report, "succeeded"), vec!["zone"]);
}
