//! Implementation of the `deploy plan` command.
//!
//! Shows what `up` (or `down`, with `--destroy`) would do. Reads state under
//! shared locks and never calls the provider.

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;

use scopedeploy_lib::execute::Action;

use super::{GlobalArgs, parse_scope, runtime};
use crate::output::{print_json, print_plan};

#[derive(Debug, Args)]
pub struct PlanArgs {
  /// Lifecycle group: base, runtime or all
  #[arg(long)]
  pub scope: String,

  /// Target environment
  #[arg(long)]
  pub env: String,

  /// Plan a teardown instead of a deployment
  #[arg(long)]
  pub destroy: bool,
}

pub fn cmd_plan(global: &GlobalArgs, args: &PlanArgs) -> Result<()> {
  let scope = parse_scope(&args.scope)?;
  let deployer = global.deployer(&args.env, CancellationToken::new())?;
  let action = if args.destroy { Action::Destroy } else { Action::Create };

  let plan = runtime()?.block_on(deployer.plan(action, scope))?;

  if global.output.is_json() {
    print_json(&plan)?;
  } else {
    print_plan(&plan, true);
  }
  Ok(())
}
