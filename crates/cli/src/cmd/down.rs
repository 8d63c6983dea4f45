//! Implementation of the `deploy down` command.
//!
//! Destroys every recorded resource of the requested scope, dependents first.
//! Base resources are only destroyed with `--confirm=destroy-base`; the
//! guard runs before anything is read or shown.

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
pub struct DownArgs {
  /// Lifecycle group: base, runtime or all
  #[arg(long)]
  pub scope: String,

  /// Target environment
  #[arg(long)]
  pub env: String,

  /// Confirmation token required to destroy base resources
  #[arg(long, value_name = "TOKEN")]
  pub confirm: Option<String>,

  /// Skip the confirmation prompt
  #[arg(long)]
  pub auto_approve: bool,
}

pub fn cmd_down(global: &GlobalArgs, args: &DownArgs) -> Result<()> {
  let scope = parse_scope(&args.scope)?;
  let cancel = CancellationToken::new();
  let deployer = global.deployer(&args.env, cancel.clone())?;
  deployer.authorize(Action::Destroy, scope, args.confirm.as_deref())?;

  runtime()?.block_on(run(global, args, scope, &deployer, &cancel))
}

async fn run(
  global: &GlobalArgs,
  args: &DownArgs,
  scope: DeploymentScope,
  deployer: &Deployer,
  cancel: &CancellationToken,
) -> Result<()> {
  let plan = deployer.plan(Action::Destroy, scope).await?;
  if !global.output.is_json() {
    print_plan(&plan, global.verbose);
  }

  if !plan.is_noop() {
    let mut prompt = format!(
      "Destroy {} resource(s) in environment '{}'?",
      plan.to_destroy.len(),
      args.env
    );
    if plan.touches_base() {
      prompt.push_str(" This includes shared base resources.");
    }
    if !confirm(&prompt, args.auto_approve)? {
      print_info("Aborted, nothing was changed.");
      return Ok(());
    }
  }

  cancel_on_ctrl_c(cancel);
  let request = DeployRequest {
    confirm: args.confirm.clone(),
    ..DeployRequest::new(scope)
  };

  let started = Instant::now();
  let result = deployer.down(&request).await;
  finish(result, started.elapsed(), global.output)
}
