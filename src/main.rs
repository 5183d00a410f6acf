//! phpunit-parallel - parallel PHPUnit orchestrator
//!
//! Splits a PHPUnit suite across N workers, runs each worker's test runner
//! in its own process and merges the TeamCity streams they produce.
//!
//! ## Features
//!
//! - Deterministic, file-level distribution of tests across workers
//! - Per-run and per-worker hooks with a guaranteed cleanup phase
//! - A single coherent TeamCity stream for CI servers
//! - A live terminal dashboard for interactive use
//!
//! ## Usage
//!
//! ```bash
//! # Run the suite from phpunit.xml on every core
//! phpunit-parallel
//!
//! # Four workers, one database per worker
//! phpunit-parallel --workers 4 \
//!     --before-worker 'createdb app_test_$WORKER_ID' \
//!     --after-worker 'dropdb app_test_$WORKER_ID'
//!
//! # CI: TeamCity messages on stdout
//! phpunit-parallel --teamcity --group integration
//! ```

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

mod cli;
mod config;
mod distributor;
mod error;
mod executor;
mod models;
mod output;
mod protocol;
mod tui;
mod utils;

use cli::Args;
use config::{ConfigFile, EnvConfig, RunnerConfig, SuiteConfig};
use executor::Runner;
use output::{Output, SummaryFormatter, TeamCityOutput};
use tui::DashboardOutput;
use utils::{LogLevel, LogTarget};

#[tokio::main]
async fn main() {
    let code = match run(Args::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(args: Args) -> Result<i32> {
    let env = EnvConfig::load()?;
    let replay = args.teamcity || !std::io::stdout().is_terminal();

    let level = if args.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let target = match (&args.log_file, replay) {
        (Some(path), _) => LogTarget::File(path.clone()),
        (None, true) => LogTarget::Stderr,
        // The dashboard owns the terminal
        (None, false) => LogTarget::Off,
    };
    utils::init_logger(level, target, env.log.as_deref())?;

    let config = Arc::new(resolve_config(&args, &env)?);
    debug!("Resolved configuration: {:?}", config);

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let suite_path = config.suite_config_path(&cwd);
    let suite = SuiteConfig::load(&suite_path)?;
    info!("Using suite configuration {}", suite_path.display());

    let output: Arc<dyn Output> = if replay {
        Arc::new(TeamCityOutput::stdout())
    } else {
        Arc::new(DashboardOutput::new())
    };

    let runner = Runner::new(config, suite, output);
    debug!("Project root: {}", runner.base_dir().display());
    let summary = runner.run().await?;

    let formatter = if std::io::stderr().is_terminal() {
        SummaryFormatter::new()
    } else {
        SummaryFormatter::new().no_color()
    };
    eprintln!("{}", formatter.format(&summary));

    Ok(summary.exit_code())
}

/// Layer defaults, the runner config file, the environment and the flags
fn resolve_config(args: &Args, env: &EnvConfig) -> Result<RunnerConfig> {
    let explicit = args.runner_config.as_deref().or(env.runner_config.as_deref());

    let mut config = RunnerConfig::default();
    if let Some((path, file)) = ConfigFile::load_optional(explicit)? {
        info!("Loaded runner configuration from {}", path.display());
        config = config.with_file(&file);
    }

    Ok(config.with_env(env).with_overrides(args.overrides()))
}
