//! CLI argument parsing
//!
//! Defines the command-line interface using clap. Every setting is optional
//! here; unset flags leave the file and environment layers in place.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ConfigOverrides, Hooks, Selectors};

/// Run a PHPUnit suite across parallel workers
#[derive(Parser, Debug)]
#[command(name = "phpunit-parallel")]
#[command(version)]
#[command(about = "Run a PHPUnit test suite across parallel workers")]
#[command(long_about = None)]
pub struct Args {
    /// PHPUnit configuration file (default: phpunit.xml, then phpunit.xml.dist)
    #[arg(short, long, value_name = "PATH")]
    pub configuration: Option<PathBuf>,

    /// Runner configuration file (YAML, JSON or XML)
    #[arg(long, value_name = "PATH")]
    pub runner_config: Option<PathBuf>,

    /// Number of workers (default: available parallelism)
    #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub workers: Option<u32>,

    /// Only run tests matching the filter expression
    #[arg(long, value_name = "EXPR")]
    pub filter: Option<String>,

    /// Only run tests from the given group
    #[arg(long, value_name = "NAME")]
    pub group: Option<String>,

    /// Exclude tests from the given group
    #[arg(long, value_name = "NAME")]
    pub exclude_group: Option<String>,

    /// Directory for generated worker configurations
    #[arg(long, value_name = "DIR")]
    pub config_build_dir: Option<String>,

    /// File name suffix that marks test files
    #[arg(long, value_name = "SUFFIX")]
    pub test_suffix: Option<String>,

    /// Command run once before any worker starts
    #[arg(long, value_name = "CMD")]
    pub before: Option<String>,

    /// Command run in each worker before its tests
    #[arg(long, value_name = "CMD")]
    pub before_worker: Option<String>,

    /// Test runner command
    #[arg(long, value_name = "CMD")]
    pub run_worker: Option<String>,

    /// Command run for each worker during cleanup
    #[arg(long, value_name = "CMD")]
    pub after_worker: Option<String>,

    /// Command run once after cleanup
    #[arg(long, value_name = "CMD")]
    pub after: Option<String>,

    /// Write a TeamCity message stream instead of the dashboard
    #[arg(long)]
    pub teamcity: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Write logs to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Args {
    /// Flag layer of the runner configuration
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            workers: self.workers.map(|n| n as usize),
            config_build_dir: self.config_build_dir.clone(),
            run_worker: self.run_worker.clone(),
            test_suffix: self.test_suffix.clone(),
            configuration: self.configuration.clone(),
            hooks: Hooks {
                before: self.before.clone(),
                before_worker: self.before_worker.clone(),
                after_worker: self.after_worker.clone(),
                after: self.after.clone(),
            },
            selectors: Selectors {
                filter: self.filter.clone(),
                group: self.group.clone(),
                exclude_group: self.exclude_group.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flags() {
        let args = Args::parse_from(["phpunit-parallel"]);
        assert!(!args.teamcity);
        assert!(!args.verbose);

        let overrides = args.overrides();
        assert!(overrides.workers.is_none());
        assert!(overrides.selectors.is_empty());
        assert_eq!(overrides.hooks, Hooks::default());
    }

    #[test]
    fn test_flags_map_to_overrides() {
        let args = Args::parse_from([
            "phpunit-parallel",
            "--workers",
            "6",
            "--configuration",
            "ci/phpunit.xml",
            "--group",
            "db",
            "--exclude-group",
            "slow",
            "--before-worker",
            "./create-db.sh",
            "--run-worker",
            "php -d memory_limit=-1 vendor/bin/phpunit",
            "--teamcity",
        ]);
        let overrides = args.overrides();

        assert_eq!(overrides.workers, Some(6));
        assert_eq!(overrides.configuration, Some(PathBuf::from("ci/phpunit.xml")));
        assert_eq!(overrides.selectors.group.as_deref(), Some("db"));
        assert_eq!(overrides.selectors.exclude_group.as_deref(), Some("slow"));
        assert_eq!(overrides.hooks.before_worker.as_deref(), Some("./create-db.sh"));
        assert_eq!(
            overrides.run_worker.as_deref(),
            Some("php -d memory_limit=-1 vendor/bin/phpunit")
        );
        assert!(args.teamcity);
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(Args::try_parse_from(["phpunit-parallel", "--workers", "0"]).is_err());
    }
}
