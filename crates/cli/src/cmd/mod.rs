mod down;
mod plan;
mod status;
mod up;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scopedeploy_lib::catalog::Catalog;
use scopedeploy_lib::config::DeployConfig;
use scopedeploy_lib::execute::ApplyReport;
use scopedeploy_lib::scope::DeploymentScope;
use scopedeploy_lib::{DeployError, Deployer};

use crate::output::{OutputFormat, print_json, print_report};

pub use down::{DownArgs, cmd_down};
pub use plan::{PlanArgs, cmd_plan};
pub use status::cmd_status;
pub use up::{UpArgs, cmd_up};

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
  pub config: PathBuf,
  pub catalog: Option<PathBuf>,
  pub output: OutputFormat,
  pub lock_timeout: Option<Duration>,
  pub verbose: bool,
}

impl GlobalArgs {
  /// Load config and catalog and build a deployer for `env`.
  ///
  /// A missing config file is not an error: defaults apply, rooted at the
  /// current directory.
  pub fn deployer(&self, env: &str, cancel: CancellationToken) -> Result<Deployer> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let config = DeployConfig::load_or_default(&self.config, &cwd).map_err(DeployError::from)?;

    let catalog_path = self.catalog.clone().unwrap_or_else(|| config.catalog_path());
    debug!(path = %catalog_path.display(), "loading catalog");
    let catalog = Catalog::load(&catalog_path).map_err(DeployError::from)?;

    let mut deployer = Deployer::from_config(config, catalog, env)?.with_cancellation(cancel);
    if let Some(timeout) = self.lock_timeout {
      deployer = deployer.with_lock_timeout(timeout);
    }
    Ok(deployer)
  }
}

/// Parse `--scope`, reporting a bad value as an invalid-input deploy error.
pub fn parse_scope(value: &str) -> Result<DeploymentScope> {
  Ok(value.parse::<DeploymentScope>().map_err(DeployError::from)?)
}

pub fn runtime() -> Result<Runtime> {
  Runtime::new().context("Failed to create async runtime")
}

/// Cancel `cancel` on Ctrl-C. Calls already in flight are allowed to finish.
///
/// Must be called from within the runtime.
pub fn cancel_on_ctrl_c(cancel: &CancellationToken) {
  let cancel = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupted, waiting for in-flight provider calls to finish");
      cancel.cancel();
    }
  });
}

/// Print the outcome of an `up` or `down` and turn a failed run into an error.
pub fn finish(result: Result<ApplyReport, DeployError>, elapsed: Duration, output: OutputFormat) -> Result<()> {
  let report = match &result {
    Ok(report) => Some(report),
    Err(err) => err.report(),
  };
  if let Some(report) = report {
    if output.is_json() {
      print_json(report)?;
    } else {
      print_report(report, elapsed);
    }
  }
  result.map(|_| ()).map_err(Into::into)
}
