//! Run result models
//!
//! Per-test status and the outcome of a complete run.

use std::fmt;
use std::time::Duration;

use crate::error::{HookError, WorkerError};
use crate::executor::signals::INTERRUPTED_EXIT_CODE;

/// State of a single test as seen in the output stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TestStatus {
    Running,
    Passed,
    Failed,
    Skipped,
}

impl TestStatus {
    /// Once terminal, a test's status never changes again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TestStatus::Running)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Running => "●",
            TestStatus::Passed => "✓",
            TestStatus::Failed => "✗",
            TestStatus::Skipped => "○",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Running => write!(f, "RUNNING"),
            TestStatus::Passed => write!(f, "PASS"),
            TestStatus::Failed => write!(f, "FAIL"),
            TestStatus::Skipped => write!(f, "SKIP"),
        }
    }
}

/// Outcome of one worker
#[derive(Debug)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub test_count: usize,
    pub duration: Duration,
    pub error: Option<WorkerError>,
    /// The worker was still running when the run was cancelled
    pub interrupted: bool,
}

impl WorkerReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && !self.interrupted
    }
}

/// Outcome of a complete run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub workers: Vec<WorkerReport>,
    pub test_count: usize,
    pub interrupted: bool,
    /// Failure of the global after hook
    pub after_hook_error: Option<HookError>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn failed_workers(&self) -> impl Iterator<Item = &WorkerReport> {
        self.workers.iter().filter(|w| !w.succeeded())
    }

    /// True iff every worker and hook succeeded and nothing was cancelled
    pub fn succeeded(&self) -> bool {
        !self.interrupted
            && self.after_hook_error.is_none()
            && self.workers.iter().all(WorkerReport::succeeded)
    }

    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            INTERRUPTED_EXIT_CODE
        } else if self.succeeded() {
            0
        } else {
            1
        }
    }
}
