//! Run orchestration
//!
//! Discovers tests, distributes them over workers, supervises the workers
//! and runs hooks and cleanup around them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{RunnerConfig, SuiteConfig};
use crate::distributor;
use crate::error::{RunError, WorkerError};
use crate::executor::discovery;
use crate::executor::hooks::{Hook, ParallelEnv};
use crate::executor::signals::{self, SignalGate};
use crate::executor::worker::{Worker, WorkerContext};
use crate::models::{RunSummary, WorkerReport};
use crate::output::{Output, StartOptions};
use crate::utils::Timer;

/// Runs every worker's after-worker hook, at most once
pub struct Cleanup {
    workers: Vec<Arc<Worker>>,
    output: Arc<dyn Output>,
    gate: Arc<SignalGate>,
    has_hook: bool,
    done: OnceCell<()>,
}

impl Cleanup {
    pub fn new(
        workers: Vec<Arc<Worker>>,
        output: Arc<dyn Output>,
        gate: Arc<SignalGate>,
        has_hook: bool,
    ) -> Self {
        Self {
            workers,
            output,
            gate,
            has_hook,
            done: OnceCell::new(),
        }
    }

    /// Run cleanup. Concurrent and repeated calls wait for the first one.
    pub async fn run(&self) {
        self.done.get_or_init(|| self.run_hooks()).await;
    }

    async fn run_hooks(&self) {
        self.gate.begin_cleanup();

        if self.has_hook {
            let total = self.workers.len();
            let completed = AtomicUsize::new(0);
            self.output.cleanup_progress(0, total);

            join_all(self.workers.iter().map(|worker| {
                let completed = &completed;
                async move {
                    if let Err(e) = worker.run_after_hook().await {
                        warn!("After-worker hook for worker {} failed: {}", worker.id, e);
                    }
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    self.output.cleanup_progress(done, total);
                }
            }))
            .await;
        }

        self.gate.restore();
    }
}

/// Orchestrates a complete parallel run
pub struct Runner {
    config: Arc<RunnerConfig>,
    suite: SuiteConfig,
    base_dir: PathBuf,
    output: Arc<dyn Output>,
    listen_for_signals: bool,
}

impl Runner {
    pub fn new(config: Arc<RunnerConfig>, suite: SuiteConfig, output: Arc<dyn Output>) -> Self {
        let dir = suite.base_dir();
        let base_dir = std::fs::canonicalize(&dir).unwrap_or(dir);

        Self {
            config,
            suite,
            base_dir,
            output,
            listen_for_signals: true,
        }
    }

    /// Leave SIGINT/SIGTERM alone; cancellation then only comes from the output
    pub fn without_signal_handlers(mut self) -> Self {
        self.listen_for_signals = false;
        self
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Run the whole suite.
    ///
    /// Errors are returned only for failures before any worker starts.
    /// Worker and after-hook failures are recorded in the summary.
    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let timer = Timer::start("run");

        let tests = discovery::discover(&self.suite, &self.base_dir, &self.config.test_suffix)?;
        let distribution = distributor::partition(&tests, self.config.workers);
        if distribution.test_count() == 0 {
            warn!("No test files found in {}", self.suite.path.display());
        } else if distribution.worker_count() > tests.len() {
            debug!(
                "Only {} test files for {} workers, idle workers are not started",
                tests.len(),
                distribution.worker_count()
            );
        }

        for worker_id in 0..distribution.worker_count() {
            if let Some(files) = distribution.worker_tests(worker_id) {
                debug!("Worker {} assigned {} test files", worker_id, files.len());
            }
        }

        let buckets = distribution.non_empty();
        let worker_count = buckets.len();
        let env = ParallelEnv::new(&self.base_dir, worker_count);
        info!(
            "Distributing {} test files across {} workers",
            tests.len(),
            worker_count
        );

        if let Some(before) = &self.config.hooks.before {
            info!("Running before hook");
            Hook::new(before, &self.base_dir)
                .with_env(env.vars())
                .inherit_output()
                .run()
                .await
                .map_err(RunError::BeforeHook)?;
        }

        let config_build_dir = self.base_dir.join(&self.config.config_build_dir);
        std::fs::create_dir_all(&config_build_dir).map_err(|source| RunError::BuildDir {
            path: config_build_dir.clone(),
            source,
        })?;

        let ctx = Arc::new(WorkerContext {
            base_dir: self.base_dir.clone(),
            config_build_dir,
            run_worker: self.config.run_worker.clone(),
            hooks: self.config.hooks.clone(),
            selectors: self.config.selectors.clone(),
            suite_xml: self.suite.raw_xml.clone(),
            bootstrap: self.suite.bootstrap.clone(),
            env: env.clone(),
            output: self.output.clone(),
        });

        let workers: Vec<Arc<Worker>> = buckets
            .into_iter()
            .map(|bucket| Arc::new(Worker::new(bucket, ctx.clone())))
            .collect();

        let gate = Arc::new(SignalGate::new());
        let token = CancellationToken::new();
        self.output.set_cancel_hook(token.clone());
        if self.listen_for_signals {
            signals::spawn_listener(gate.clone(), token.clone(), self.output.clone());
        }

        self.output.start(&StartOptions {
            test_count: tests.len(),
            worker_count,
            selectors: self.config.selectors.clone(),
        });

        let handles = workers.iter().map(|worker| {
            let worker = worker.clone();
            let output = self.output.clone();
            let token = token.clone();
            tokio::spawn(async move { supervise(worker, output, token).await })
        });

        let reports: Vec<WorkerReport> = join_all(handles.collect::<Vec<_>>())
            .await
            .into_iter()
            .zip(&workers)
            .map(|(joined, worker)| {
                joined.unwrap_or_else(|e| WorkerReport {
                    worker_id: worker.id,
                    test_count: worker.test_count(),
                    duration: timer.elapsed(),
                    error: Some(WorkerError::Task(e.to_string())),
                    interrupted: false,
                })
            })
            .collect();

        let interrupted = token.is_cancelled();
        if interrupted {
            info!("Run cancelled, cleaning up");
        }

        let cleanup = Cleanup::new(
            workers.clone(),
            self.output.clone(),
            gate,
            self.config.hooks.after_worker.is_some(),
        );
        cleanup.run().await;

        self.output.finish().await;

        let mut summary = RunSummary {
            workers: reports,
            test_count: tests.len(),
            interrupted,
            after_hook_error: None,
            duration: timer.elapsed(),
        };

        if interrupted {
            return Ok(summary);
        }

        if let Some(after) = &self.config.hooks.after {
            info!("Running after hook");
            if let Err(e) = Hook::new(after, &self.base_dir)
                .with_env(env.vars())
                .inherit_output()
                .run()
                .await
            {
                warn!("After hook failed: {}", e);
                summary.after_hook_error = Some(e);
            }
        }

        summary.duration = timer.stop();
        Ok(summary)
    }
}

/// Run one worker until it finishes or the run is cancelled
async fn supervise(
    worker: Arc<Worker>,
    output: Arc<dyn Output>,
    token: CancellationToken,
) -> WorkerReport {
    let timer = Timer::start(format!("worker {}", worker.id));
    output.worker_started(worker.id, worker.test_count());

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = worker.run() => Some(result),
    };

    let Some(result) = result else {
        debug!("Worker {} interrupted", worker.id);
        return WorkerReport {
            worker_id: worker.id,
            test_count: worker.test_count(),
            duration: timer.elapsed(),
            error: None,
            interrupted: true,
        };
    };

    if let Err(e) = &result {
        warn!("Worker {} failed: {}", worker.id, e);
    }
    output.worker_completed(worker.id, result.as_ref().err());

    WorkerReport {
        worker_id: worker.id,
        test_count: worker.test_count(),
        duration: timer.stop(),
        error: result.err(),
        interrupted: false,
    }
}
