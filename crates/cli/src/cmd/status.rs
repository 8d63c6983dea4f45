//! Status command implementation.
//!
//! Lists the recorded resources of both partitions of one environment.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use super::{GlobalArgs, runtime};
use crate::output::{print_json, print_status};

pub fn cmd_status(global: &GlobalArgs, env: &str) -> Result<()> {
  let deployer = global.deployer(env, CancellationToken::new())?;
  let states = runtime()?.block_on(deployer.status())?;

  if global.output.is_json() {
    let json_output = serde_json::json!({ "env": deployer.env(), "partitions": states });
    print_json(&json_output)?;
  } else {
    print_status(deployer.env(), &states);
  }
  Ok(())
}
