//! Run summary formatter
//!
//! Renders the final [`RunSummary`] as a framed table for the terminal.

use crate::models::{RunSummary, TestStatus, WorkerReport};
use crate::utils::format_duration;

/// Formats the end-of-run summary
pub struct SummaryFormatter {
    colorize: bool,
}

impl Default for SummaryFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl SummaryFormatter {
    pub fn new() -> Self {
        Self { colorize: true }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    fn paint(&self, text: &str, color: &str) -> String {
        if self.colorize {
            format!("\x1b[{color}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn status(&self, report: &WorkerReport) -> String {
        if report.interrupted {
            self.paint("○ STOP", "33")
        } else if report.succeeded() {
            self.paint(&format!("{} {}", TestStatus::Passed.symbol(), TestStatus::Passed), "32")
        } else {
            self.paint(&format!("{} {}", TestStatus::Failed.symbol(), TestStatus::Failed), "31")
        }
    }

    fn format_worker(&self, report: &WorkerReport) -> String {
        format!(
            "║  Worker {:<3} {}  {:>5} files  {:>9}",
            report.worker_id,
            self.status(report),
            report.test_count,
            format_duration(report.duration)
        )
    }

    /// Format the run summary, followed by details of every failure
    pub fn format(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════╗\n");
        output.push_str("║  phpunit-parallel                                ║\n");
        output.push_str("╠══════════════════════════════════════════════════╣\n");

        for report in &summary.workers {
            output.push_str(&self.format_worker(report));
            output.push('\n');
        }

        output.push_str("╠══════════════════════════════════════════════════╣\n");

        let failed = summary.failed_workers().filter(|w| !w.interrupted).count();
        let failed_str = if failed > 0 {
            self.paint(&failed.to_string(), "31")
        } else {
            failed.to_string()
        };
        output.push_str(&format!(
            "║  Workers: {} | Failed: {} | Test files: {}\n",
            summary.workers.len(),
            failed_str,
            summary.test_count
        ));

        let verdict = if summary.interrupted {
            self.paint("INTERRUPTED", "33")
        } else if summary.succeeded() {
            self.paint("PASSED", "32")
        } else {
            self.paint("FAILED", "31")
        };
        output.push_str(&format!(
            "║  Result: {} | Duration: {}\n",
            verdict,
            format_duration(summary.duration)
        ));
        output.push_str("╚══════════════════════════════════════════════════╝\n");

        for report in summary.failed_workers() {
            if let Some(error) = &report.error {
                output.push_str(&format!(
                    "\n{} {}\n",
                    self.paint(&format!("Worker {}:", report.worker_id), "31"),
                    error
                ));
            }
        }

        if let Some(error) = &summary.after_hook_error {
            output.push_str(&format!(
                "\n{} {}\n",
                self.paint("After hook:", "31"),
                error
            ));
        }

        output
    }
}
