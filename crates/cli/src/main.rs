mod cmd;
mod output;
mod prompts;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scopedeploy_lib::DeployError;
use scopedeploy_lib::config::DEFAULT_CONFIG_FILE;
use scopedeploy_lib::deploy::exit_code;

use crate::cmd::{DownArgs, GlobalArgs, PlanArgs, UpArgs, cmd_down, cmd_plan, cmd_status, cmd_up};
use crate::output::{OutputFormat, print_error};

/// deploy - Scoped infrastructure deployments
#[derive(Parser)]
#[command(name = "deploy")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to the deployment config
  #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
  config: PathBuf,

  /// Resource catalog (overrides `catalog` in the config)
  #[arg(long, global = true)]
  catalog: Option<PathBuf>,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  /// How long to wait for a partition locked by another run (e.g. 30s)
  #[arg(long, global = true, value_parser = humantime::parse_duration)]
  lock_timeout: Option<Duration>,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Create the resources of a scope
  Up(UpArgs),

  /// Destroy the resources of a scope
  Down(DownArgs),

  /// Show what up (or down, with --destroy) would do
  Plan(PlanArgs),

  /// List recorded resources of an environment
  Status {
    /// Target environment
    #[arg(long)]
    env: String,
  },
}

fn main() -> ExitCode {
  let cli = match Cli::try_parse() {
    Ok(cli) => cli,
    Err(err) => {
      let _ = err.print();
      return if err.use_stderr() {
        ExitCode::from(exit_code::INVALID_INPUT as u8)
      } else {
        ExitCode::SUCCESS
      };
    }
  };

  let default_level = if cli.verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let global = GlobalArgs {
    config: cli.config,
    catalog: cli.catalog,
    output: cli.output,
    lock_timeout: cli.lock_timeout,
    verbose: cli.verbose,
  };

  let result = match &cli.command {
    Commands::Up(args) => cmd_up(&global, args),
    Commands::Down(args) => cmd_down(&global, args),
    Commands::Plan(args) => cmd_plan(&global, args),
    Commands::Status { env } => cmd_status(&global, env),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => match err.downcast_ref::<DeployError>() {
      // Deploy errors already carry their causes in the message.
      Some(deploy_err) => {
        print_error(&deploy_err.to_string());
        ExitCode::from(deploy_err.exit_code() as u8)
      }
      None => {
        print_error(&format!("{:#}", err));
        ExitCode::from(exit_code::FAILURE as u8)
      }
    },
  }
}
