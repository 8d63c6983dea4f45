use std::path::Path;
use std::sync::Arc;

use scopedeploy_lib::Deployer;
use scopedeploy_lib::catalog::Catalog;
use scopedeploy_lib::config::DeployConfig;
use scopedeploy_lib::provider::MemoryProvider;
use scopedeploy_lib::state::StateStore;

/// Base networking plus a runtime cluster/service pair referencing it.
pub const SCENARIO_CATALOG: &str = r#"
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

[[resource]]
id = "ecs_service"
scope = "runtime"
kind = "aws_ecs_service"
depends_on = ["ecs_cluster"]
references = { vpc = { Type = "networking" } }
"#;

/// Settings that keep retries and lock waits short.
pub fn fast_config(dir: &Path, lock_timeout_secs: u64) -> DeployConfig {
  let content = format!(
    "[settings]\nparallelism = 4\nmax_attempts = 3\ncall_timeout_secs = 5\nlock_timeout_secs = {}\n",
    lock_timeout_secs
  );
  DeployConfig::from_toml(&content, dir.to_path_buf()).unwrap()
}

pub fn catalog(content: &str) -> Catalog {
  Catalog::from_toml(content).unwrap()
}

pub fn deployer(dir: &Path, catalog_toml: &str, provider: Arc<MemoryProvider>) -> Deployer {
  deployer_with_timeout(dir, catalog_toml, provider, 0)
}

pub fn deployer_with_timeout(
  dir: &Path,
  catalog_toml: &str,
  provider: Arc<MemoryProvider>,
  lock_timeout_secs: u64,
) -> Deployer {
  Deployer::new(
    fast_config(dir, lock_timeout_secs),
    catalog(catalog_toml),
    "dev",
    StateStore::new(dir.join("state")),
    provider,
  )
}
