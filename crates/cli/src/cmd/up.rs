//! Implementation of the `deploy up` command.
//!
//! Creates every spec of the requested scope that has no record yet. The plan
//! is shown first and confirmed unless `--auto-approve` is given.

use std::time::Instant;

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;

use scopedeploy_lib::execute::Action;
use scopedeploy_lib::scope::DeploymentScope;
use scopedeploy_lib::{DeployRequest, Deployer};

use super::{GlobalArgs, cancel_on_ctrl_c, finish, parse_scope, runtime};
use crate::output::{print_info, print_plan};
use crate::prompts::confirm;

#[derive(Debug, Args)]
pub struct UpArgs {
  /// Lifecycle group: base, runtime or all
  #[arg(long)]
  pub scope: String,

  /// Target environment
  #[arg(long)]
  pub env: String,

  /// Skip the confirmation prompt
  #[arg(long)]
  pub auto_approve: bool,

  /// Check recorded resources against the provider and recreate missing ones
  #[arg(long)]
  pub refresh: bool,

  /// Maximum concurrent provider calls (overrides the config)
  #[arg(long)]
  pub parallelism: Option<usize>,

  /// Stop scheduling new work after the first failure
  #[arg(long)]
  pub fail_fast: bool,
}

pub fn cmd_up(global: &GlobalArgs, args: &UpArgs) -> Result<()> {
  let scope = parse_scope(&args.scope)?;
  let cancel = CancellationToken::new();
  let deployer = global.deployer(&args.env, cancel.clone())?;

  runtime()?.block_on(run(global, args, scope, &deployer, &cancel))
}

async fn run(
  global: &GlobalArgs,
  args: &UpArgs,
  scope: DeploymentScope,
  deployer: &Deployer,
  cancel: &CancellationToken,
) -> Result<()> {
  let plan = deployer.plan(Action::Create, scope).await?;
  if !global.output.is_json() {
    print_plan(&plan, global.verbose);
  }

  if !plan.is_noop() {
    let prompt = format!(
      "Create {} resource(s) in environment '{}'?",
      plan.to_create.len(),
      args.env
    );
    if !confirm(&prompt, args.auto_approve)? {
      print_info("Aborted, nothing was changed.");
      return Ok(());
    }
  }

  cancel_on_ctrl_c(cancel);
  let request = DeployRequest {
    refresh: args.refresh,
    fail_fast: args.fail_fast,
    parallelism: args.parallelism,
    ..DeployRequest::new(scope)
  };

  let started = Instant::now();
  let result = deployer.up(&request).await;
  finish(result, started.elapsed(), global.output)
}
