//! Status command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn status_of_empty_environment() {
  let env = TestEnv::new();

  env
    .deploy_cmd()
    .args(["status", "--env", "dev"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Environment dev"))
    .stdout(predicate::str::contains("nothing deployed"));
}

#[test]
fn status_lists_both_partitions() {
  let env = TestEnv::new();
  env.up("all", "dev");

  env
    .deploy_cmd()
    .args(["status", "--env", "dev"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Base (version"))
    .stdout(predicate::str::contains("Runtime (version"))
    .stdout(predicate::str::contains("2 resource(s))"))
    .stdout(predicate::str::contains("ecs_service (aws_ecs_service)"));
}

#[test]
fn status_json() {
  let env = TestEnv::new();
  env.up("base", "dev");

  let status = env.json(&["status", "--env", "dev"]);

  assert_eq!(status["env"], "dev");
  let partitions = status["partitions"].as_array().unwrap();
  assert_eq!(partitions.len(), 2);
  assert_eq!(partitions[0]["partition"]["scope"], "base");
  assert_eq!(partitions[0]["resources"].as_array().unwrap().len(), 2);
  assert_eq!(partitions[1]["partition"]["scope"], "runtime");
  assert_eq!(partitions[1]["version"], 0);
}
