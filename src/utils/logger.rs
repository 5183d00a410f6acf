//! Logging utilities
//!
//! Provides logging configuration. Log output never goes to stdout, which
//! belongs to the TeamCity stream or the dashboard.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log level configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Where log records are written
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
    /// Logging disabled
    Off,
}

/// Build the filter for a level. An override such as `debug` or a full
/// directive like `phpunit_parallel=trace` replaces the level.
fn filter(level: LogLevel, directive: Option<&str>) -> EnvFilter {
    match directive {
        Some(directive) => match LogLevel::from_str(directive) {
            Some(level) => EnvFilter::new(format!(
                "phpunit_parallel={}",
                level.to_tracing_level()
            )),
            None => EnvFilter::new(directive),
        },
        None => EnvFilter::new(format!("phpunit_parallel={}", level.to_tracing_level())),
    }
}

/// Initialize the logger with specified level
pub fn init_logger(level: LogLevel, target: LogTarget, directive: Option<&str>) -> Result<()> {
    let filter = filter(level, directive);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    let result = match target {
        LogTarget::Off => return Ok(()),
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogTarget::File(path) => {
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize logger: {e}"))
}
