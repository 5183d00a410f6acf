//! TeamCity replay output
//!
//! Writes a single coherent TeamCity service message stream to stdout for
//! CI servers, regardless of how worker output interleaves.

use std::io::{self, Write};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::WorkerError;
use crate::output::{Output, StartOptions};
use crate::protocol::ReplayAggregator;

/// Output that replays worker TeamCity streams through a [`ReplayAggregator`]
pub struct TeamCityOutput {
    replay: ReplayAggregator<Box<dyn Write + Send>>,
}

impl TeamCityOutput {
    /// Replay to stdout
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            replay: ReplayAggregator::new(sink),
        }
    }

    fn check(&self, worker_id: usize, result: io::Result<()>) {
        if let Err(e) = result {
            warn!("Failed to write output of worker {}: {}", worker_id, e);
        }
    }
}

impl Output for TeamCityOutput {
    fn start(&self, options: &StartOptions) {
        info!(
            "Running {} test files on {} workers",
            options.test_count, options.worker_count
        );
    }

    fn worker_started(&self, worker_id: usize, test_count: usize) {
        debug!("Worker {} started with {} test files", worker_id, test_count);
        self.replay.worker_started(worker_id);
    }

    fn worker_line(&self, worker_id: usize, line: &str) {
        self.check(worker_id, self.replay.push_line(worker_id, line));
    }

    fn worker_completed(&self, worker_id: usize, error: Option<&WorkerError>) {
        self.check(worker_id, self.replay.worker_completed(worker_id));
        if let Some(error) = error {
            self.check(
                worker_id,
                self.replay.worker_failed(worker_id, &error.to_string()),
            );
        }
    }

    fn cleanup_progress(&self, completed: usize, total: usize) {
        info!("Cleanup: {}/{} after-worker hooks done", completed, total);
    }

    fn finish(&self) -> BoxFuture<'_, ()> {
        if let Err(e) = self.replay.flush_all() {
            warn!("Failed to flush output: {}", e);
        }
        Box::pin(async {})
    }

    fn set_cancel_hook(&self, _token: CancellationToken) {}
}
