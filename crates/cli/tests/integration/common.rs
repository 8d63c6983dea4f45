//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Base networking plus a runtime cluster/service pair referencing it.
pub const CATALOG: &str = r#"
[[resource]]
id = "vpc"
scope = "base"
kind = "aws_vpc"
tags = { Type = "networking" }

[[resource]]
id = "subnet"
scope = "base"
kind = "aws_subnet"
depends_on = ["vpc"]

[[resource]]
id = "ecs_cluster"
scope = "runtime"
kind = "aws_ecs_cluster"
references = { vpc = { Type = "networking" } }

[[resource]]
id = "ecs_service"
scope = "runtime"
kind = "aws_ecs_service"
depends_on = ["ecs_cluster"]
"#;

/// Two environments, short lock waits.
pub const CONFIG: &str = r#"
catalog = "catalog.toml"

[settings]
lock_timeout_secs = 0
max_attempts = 2

[environments.dev]
region = "us-west-2"

[environments.prod]
region = "us-east-1"
"#;

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding `deploy.toml`,
/// `catalog.toml`, the state partitions and the local provider inventory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self::with_catalog(CATALOG)
  }

  pub fn with_catalog(catalog: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let env = Self { temp };
    env.write_file("deploy.toml", CONFIG);
    env.write_file("catalog.toml", catalog);
    env
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Root of the scope state partitions.
  pub fn state_path(&self) -> PathBuf {
    let p = self.temp.path().join("state");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Local provider inventory.
  pub fn inventory_path(&self) -> PathBuf {
    let p = self.temp.path().join("inventory");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Parsed inventory of `env`, or `Null` if nothing was ever created there.
  pub fn inventory(&self, env: &str) -> serde_json::Value {
    let path = self.inventory_path().join(format!("{}.json", env));
    match std::fs::read_to_string(path) {
      Ok(content) => serde_json::from_str(&content).unwrap(),
      Err(_) => serde_json::Value::Null,
    }
  }

  /// Number of resources the provider holds for `env`.
  pub fn inventory_len(&self, env: &str) -> usize {
    self.inventory(env)["items"].as_array().map(Vec::len).unwrap_or(0)
  }

  /// Get a pre-configured Command for the deploy binary.
  ///
  /// Runs in the temp directory with:
  /// - `SCOPEDEPLOY_STATE_DIR`: Isolated state partitions
  /// - `SCOPEDEPLOY_INVENTORY_DIR`: Isolated local provider inventory
  /// - `NO_COLOR`: Plain output for matching
  pub fn deploy_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("deploy");
    cmd.current_dir(self.temp.path());
    cmd.env("SCOPEDEPLOY_STATE_DIR", self.state_path());
    cmd.env("SCOPEDEPLOY_INVENTORY_DIR", self.inventory_path());
    cmd.env("NO_COLOR", "1");
    cmd.env("RUST_LOG", "warn");
    cmd
  }

  /// Run `up --auto-approve` and assert success.
  pub fn up(&self, scope: &str, env: &str) {
    self
      .deploy_cmd()
      .args(["up", "--scope", scope, "--env", env, "--auto-approve"])
      .assert()
      .success();
  }

  /// Run a command with `--output json` and parse stdout.
  pub fn json(&self, args: &[&str]) -> serde_json::Value {
    let output = self.deploy_cmd().args(["--output", "json"]).args(args).output().unwrap();
    assert!(
      output.status.success(),
      "command failed: {}",
      String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
  }
}
