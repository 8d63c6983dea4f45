//! CLI output formatting utilities.
//!
//! Colored status lines on the terminal, JSON on request, and the renderers
//! for plans, apply reports and partition status shared by the commands.

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use scopedeploy_lib::catalog::ResourceScope;
use scopedeploy_lib::execute::{Action, ApplyReport};
use scopedeploy_lib::plan::{Plan, PlanEntry};
use scopedeploy_lib::state::ScopeState;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const ADD: &str = "+";
  pub const REMOVE: &str = "-";
  pub const UNCHANGED: &str = "=";
}

/// Compact elapsed time, e.g. `850ms`, `2.40s`, `1m 5s`.
pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

/// Age of a record relative to `now`, rounded to whole seconds.
pub fn format_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let secs = (now - created_at).num_seconds().max(0) as u64;
  if secs == 0 {
    return "just now".to_string();
  }
  format!("{} ago", humantime::format_duration(Duration::from_secs(secs)))
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

fn print_entry(symbol: &str, entry: &PlanEntry) {
  let symbol = match symbol {
    symbols::ADD => symbol.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    symbols::REMOVE => symbol.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
    _ => symbol.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string(),
  };
  let handle = entry
    .handle
    .as_ref()
    .map(|h| format!(" {} {}", symbols::ARROW, h))
    .unwrap_or_default();
  println!("  {} {} ({}, {}){}", symbol, entry.id, entry.scope, entry.kind, handle);
}

pub fn print_plan(plan: &Plan, verbose: bool) {
  print_info(&format!(
    "Plan for {} --scope={} --env={}",
    match plan.action {
      Action::Create => "up",
      Action::Destroy => "down",
    },
    plan.scope,
    plan.env
  ));

  match plan.action {
    Action::Create => {
      for entry in &plan.to_create {
        print_entry(symbols::ADD, entry);
      }
      if verbose {
        for entry in &plan.unchanged {
          print_entry(symbols::UNCHANGED, entry);
        }
      }
    }
    Action::Destroy => {
      for entry in &plan.to_destroy {
        print_entry(symbols::REMOVE, entry);
      }
      if verbose {
        for entry in &plan.absent {
          print_entry(symbols::UNCHANGED, entry);
        }
      }
    }
  }

  if plan.action == Action::Create && !plan.orphaned.is_empty() {
    let ids: Vec<&str> = plan.orphaned.iter().map(|e| e.id.as_str()).collect();
    print_warning(&format!(
      "{} recorded resource(s) no longer in the catalog: {} (removed by 'down')",
      ids.len(),
      ids.join(", ")
    ));
  }

  println!();
  print_stat("Summary", &plan.to_string());
}

pub fn print_report(report: &ApplyReport, elapsed: Duration) {
  let verb = match report.action {
    Action::Create => "Created",
    Action::Destroy => "Destroyed",
  };

  for resource in &report.succeeded {
    println!(
      "  {} {} {} {}",
      symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
      resource.spec_id,
      symbols::ARROW,
      resource.provider_handle
    );
  }
  for failed in &report.failed {
    println!(
      "  {} {} ({}): {}",
      symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()),
      failed.id,
      failed.scope,
      failed.error
    );
  }
  for skipped in &report.skipped {
    println!(
      "  {} {} ({}): skipped, {}",
      symbols::WARNING.if_supports_color(Stream::Stdout, |s| s.yellow()),
      skipped.id,
      skipped.scope,
      skipped.reason
    );
  }

  println!();
  if report.is_success() {
    print_success(&format!(
      "{} {} resource(s) in {}",
      verb,
      report.succeeded.len(),
      format_duration(elapsed)
    ));
  }
  print_stat("Summary", &report.to_string());
}

pub fn print_status(env: &str, states: &[ScopeState]) {
  let now = Utc::now();
  print_info(&format!("Environment {}", env));

  for state in states {
    println!();
    let label = match state.partition.scope {
      ResourceScope::Base => "Base",
      ResourceScope::Runtime => "Runtime",
    };
    println!(
      "{} (version {}, {} resource(s))",
      label.if_supports_color(Stream::Stdout, |s| s.bold()),
      state.version,
      state.len()
    );
    if state.is_empty() {
      println!("  {}", "nothing deployed".if_supports_color(Stream::Stdout, |s| s.dimmed()));
    }
    for resource in state.resources() {
      println!(
        "  {} {} ({}) {} {}, {}",
        symbols::INFO,
        resource.spec_id,
        resource.kind,
        symbols::ARROW,
        resource.provider_handle,
        format_age(resource.created_at, now)
      );
    }
  }
}
