//! Plan command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

fn ids(plan: &serde_json::Value, field: &str) -> Vec<String> {
  plan[field]
    .as_array()
    .unwrap()
    .iter()
    .map(|e| e["id"].as_str().unwrap().to_string())
    .collect()
}

#[test]
fn plan_lists_specs_to_create() {
  let env = TestEnv::new();

  env
    .deploy_cmd()
    .args(["plan", "--scope", "all", "--env", "dev"])
    .assert()
    .success()
    .stdout(predicate::str::contains("+ vpc"))
    .stdout(predicate::str::contains("+ ecs_service"))
    .stdout(predicate::str::contains("4 to create, 0 unchanged"));
}

#[test]
fn plan_never_calls_the_provider() {
  let env = TestEnv::new();

  env
    .deploy_cmd()
    .args(["plan", "--scope", "runtime", "--env", "dev"])
    .assert()
    .success();

  assert_eq!(env.inventory("dev"), serde_json::Value::Null);
}

#[test]
fn plan_json_reflects_recorded_state() {
  let env = TestEnv::new();
  env.up("base", "dev");

  let plan = env.json(&["plan", "--scope", "all", "--env", "dev"]);

  assert_eq!(plan["action"], "create");
  assert_eq!(plan["scope"], "all");
  assert_eq!(ids(&plan, "to_create"), vec!["ecs_cluster", "ecs_service"]);
  assert_eq!(ids(&plan, "unchanged"), vec!["vpc", "subnet"]);
  assert!(plan["unchanged"][0]["handle"].as_str().unwrap().starts_with("aws_vpc-"));
}

#[test]
fn destroy_plan_orders_dependents_first() {
  let env = TestEnv::new();
  env.up("all", "dev");

  let plan = env.json(&["plan", "--scope", "all", "--env", "dev", "--destroy"]);

  assert_eq!(plan["action"], "destroy");
  assert_eq!(ids(&plan, "to_destroy"), vec!["ecs_service", "ecs_cluster", "subnet", "vpc"]);
}

#[test]
fn destroy_plan_needs_no_token() {
  let env = TestEnv::new();
  env.up("base", "dev");

  env
    .deploy_cmd()
    .args(["plan", "--scope", "base", "--env", "dev", "--destroy"])
    .assert()
    .success()
    .stdout(predicate::str::contains("2 to destroy"));
}

#[test]
fn removed_catalog_entry_shows_as_orphan() {
  let env = TestEnv::new();
  env.up("base", "dev");
  env.write_file(
    "catalog.toml",
    r#"
[[resource]]
id = "vpc"
scope = "base"
kind = "aws_vpc"
tags = { Type = "networking" }
"#,
  );

  let plan = env.json(&["plan", "--scope", "base", "--env", "dev", "--destroy"]);

  assert_eq!(ids(&plan, "orphaned"), vec!["subnet"]);
  assert_eq!(ids(&plan, "to_destroy"), vec!["subnet", "vpc"]);
}
