//! Dashboard state
//!
//! Owned by the display task alone; every change goes through
//! [`super::update::update`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::config::Selectors;
use crate::models::TestStatus;
use crate::output::StartOptions;

/// Rows moved by PgUp/PgDn
pub const PAGE_STEP: usize = 10;

/// How long the copy notice stays visible
pub const NOTICE_DURATION: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestNode {
    /// Protocol `name`; the same name may recur within a worker
    pub key: String,
    pub name: String,
    pub status: TestStatus,
    pub message: String,
    pub details: String,
}

impl TestNode {
    pub fn new(key: &str, name: &str, status: TestStatus) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            status,
            message: String::new(),
            details: String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerNode {
    pub id: usize,
    pub tests: Vec<TestNode>,
    /// Assigned test files, the estimate until a count arrives
    pub files: usize,
    pub total: usize,
    pub has_count: bool,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub finished: bool,
    pub error: Option<String>,
}

impl WorkerNode {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Latest test with this key
    pub fn test_mut(&mut self, key: &str) -> Option<&mut TestNode> {
        self.tests.iter_mut().rev().find(|t| t.key == key)
    }

    pub fn is_done(&self) -> bool {
        self.finished || (self.has_count && self.completed >= self.total)
    }
}

/// A failed test, or a worker that failed without failing tests
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorEntry {
    pub worker_id: usize,
    pub name: String,
    pub message: String,
    pub details: String,
    pub expanded: bool,
}

impl ErrorEntry {
    /// Clipboard text: name, message and details separated by blank lines
    pub fn clipboard_text(&self) -> String {
        [&self.name, &self.message, &self.details]
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunPhase {
    Running,
    Cleanup,
    Complete,
    Exploring,
}

impl RunPhase {
    /// Phases in which the clock is still running
    pub fn is_live(&self) -> bool {
        matches!(self, RunPhase::Running | RunPhase::Cleanup)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Panel {
    Running,
    Workers,
    Errors,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub text: String,
}

#[derive(Debug)]
pub struct DisplayModel {
    pub workers: BTreeMap<usize, WorkerNode>,
    pub errors: Vec<ErrorEntry>,
    pub phase: RunPhase,
    pub panel: Panel,
    pub selectors: Selectors,
    pub worker_count: usize,
    /// Tests expected in the run; file estimates until counts arrive
    pub test_count: usize,
    pub has_count: bool,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub started: Instant,
    pub ended: Option<Instant>,
    pub cleanup: (usize, usize),
    pub running_cursor: usize,
    pub error_cursor: usize,
    pub worker_page: usize,
    /// Page count at the last render
    pub worker_pages: usize,
    pub notice: Option<Notice>,
    pub next_notice: u64,
    pub cancel_requested: bool,
}

impl DisplayModel {
    pub fn new(options: &StartOptions) -> Self {
        Self {
            workers: (0..options.worker_count)
                .map(|id| (id, WorkerNode::new(id)))
                .collect(),
            errors: Vec::new(),
            phase: RunPhase::Running,
            panel: Panel::Errors,
            selectors: options.selectors.clone(),
            worker_count: options.worker_count,
            test_count: options.test_count,
            has_count: false,
            completed: 0,
            failed: 0,
            skipped: 0,
            started: Instant::now(),
            ended: None,
            cleanup: (0, 0),
            running_cursor: 0,
            error_cursor: 0,
            worker_page: 0,
            worker_pages: 1,
            notice: None,
            next_notice: 0,
            cancel_requested: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self.ended {
            Some(ended) => ended.duration_since(self.started),
            None => self.started.elapsed(),
        }
    }

    pub fn passed(&self) -> usize {
        self.completed
            .saturating_sub(self.failed)
            .saturating_sub(self.skipped)
    }

    /// True when any test or worker failed
    pub fn is_failed(&self) -> bool {
        self.failed > 0 || self.workers.values().any(|w| w.error.is_some())
    }

    /// Tests currently running, in worker order
    pub fn running_tests(&self) -> Vec<&TestNode> {
        self.workers
            .values()
            .flat_map(|w| w.tests.iter())
            .filter(|t| t.status == TestStatus::Running)
            .collect()
    }

    /// Estimated time left, once at least one test completed
    pub fn eta(&self) -> Option<(Duration, Duration)> {
        if self.phase != RunPhase::Running || !self.has_count || self.completed == 0 {
            return None;
        }
        if self.test_count == 0 {
            return None;
        }
        let elapsed = self.elapsed();
        let total = elapsed.mul_f64(self.test_count as f64 / self.completed as f64);
        Some((total.saturating_sub(elapsed), total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_model_creates_workers() {
        let model = DisplayModel::new(&StartOptions {
            test_count: 12,
            worker_count: 3,
            selectors: Selectors::default(),
        });
        assert_eq!(model.workers.len(), 3);
        assert_eq!(model.phase, RunPhase::Running);
        assert_eq!(model.panel, Panel::Errors);
        assert!(!model.is_failed());
        assert!(model.eta().is_none());
    }

    #[test]
    fn test_clipboard_text_skips_empty_parts() {
        let entry = ErrorEntry {
            worker_id: 0,
            name: "testAdd".into(),
            message: "Failed asserting that 3 is 4.".into(),
            details: String::new(),
            expanded: false,
        };
        assert_eq!(entry.clipboard_text(), "testAdd\n\nFailed asserting that 3 is 4.");
    }

    #[test]
    fn test_phase_order() {
        assert!(RunPhase::Running < RunPhase::Cleanup);
        assert!(RunPhase::Complete < RunPhase::Exploring);
        assert!(RunPhase::Cleanup.is_live());
        assert!(!RunPhase::Complete.is_live());
    }
}
