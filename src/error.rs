//! Error types
//!
//! Typed failures for the run engine. Configuration loading and `main` use
//! `anyhow` on top of these.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Number of stderr lines kept from a failed test runner
pub const STDERR_TAIL_LINES: usize = 20;

/// A shell hook that could not be run or exited unsuccessfully
#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: ExitStatus },
}

/// Failure while collecting test files from the suite configuration
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("test directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("failed to scan {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("invalid exclude pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Failure of a single worker. Never affects sibling workers.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("before-worker hook failed: {0}")]
    BeforeHook(#[source] HookError),

    #[error("failed to write worker config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start test runner: {0}")]
    Spawn(#[source] io::Error),

    #[error("failed to read test runner output: {0}")]
    Io(#[source] io::Error),

    #[error("test runner exited with {status}{}", tail_suffix(.stderr_tail))]
    Exited {
        status: ExitStatus,
        stderr_tail: Vec<String>,
    },

    #[error("worker task failed: {0}")]
    Task(String),
}

fn tail_suffix(lines: &[String]) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        format!("\n{}", lines.join("\n"))
    }
}

/// Failure that prevents a run from starting or completing
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to discover tests: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("before hook failed: {0}")]
    BeforeHook(#[source] HookError),

    #[error("failed to create config build directory {}: {source}", .path.display())]
    BuildDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_suffix() {
        assert_eq!(tail_suffix(&[]), "");
        assert_eq!(
            tail_suffix(&["PHP Fatal error".to_string(), "Stack trace:".to_string()]),
            "\nPHP Fatal error\nStack trace:"
        );
    }

    #[test]
    fn test_discovery_error_display() {
        let err = RunError::from(DiscoveryError::MissingDirectory(PathBuf::from("tests/Unit")));
        assert_eq!(
            err.to_string(),
            "failed to discover tests: test directory not found: tests/Unit"
        );
    }
}
