//! Run output
//!
//! The runner reports progress through the [`Output`] trait. Two
//! implementations exist: a TeamCity replay stream for CI and the
//! interactive dashboard in [`crate::tui`].

mod formatter;
mod teamcity;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::config::Selectors;
use crate::error::WorkerError;

pub use formatter::SummaryFormatter;
pub use teamcity::TeamCityOutput;

/// Facts about a run known before any worker starts
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StartOptions {
    pub test_count: usize,
    pub worker_count: usize,
    pub selectors: Selectors,
}

/// Receiver of run progress.
///
/// Calls for one worker arrive in order; calls for different workers may
/// interleave arbitrarily.
pub trait Output: Send + Sync {
    fn start(&self, options: &StartOptions);

    fn worker_started(&self, worker_id: usize, test_count: usize);

    /// One line of test runner stdout
    fn worker_line(&self, worker_id: usize, line: &str);

    fn worker_completed(&self, worker_id: usize, error: Option<&WorkerError>);

    /// After-worker hooks finished so far
    fn cleanup_progress(&self, completed: usize, total: usize);

    /// Called once after cleanup; resolves when the output is done
    fn finish(&self) -> BoxFuture<'_, ()>;

    /// Token the output may cancel to stop the run
    fn set_cancel_hook(&self, token: CancellationToken);

    /// Release anything held on the terminal before the process exits
    fn shutdown(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}
