//! Worker execution
//!
//! A worker owns one bucket of test files. It writes a trimmed copy of the
//! suite configuration listing only its files, runs the test runner against
//! it and streams the runner's stdout to the output.

use std::collections::VecDeque;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, LazyLock};

use regex::{NoExpand, Regex};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{Hooks, Selectors};
use crate::distributor::{TestFile, WorkerBucket};
use crate::error::{HookError, WorkerError, STDERR_TAIL_LINES};
use crate::executor::hooks::{Hook, ParallelEnv};
use crate::output::Output;

static TESTSUITES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<testsuites[^>]*>.*?</testsuites>").expect("valid regex"));

static BOOTSTRAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bbootstrap="[^"]*""#).expect("valid regex"));

/// Placeholder in the run command replaced by the runner arguments
pub const ARGS_PLACEHOLDER: &str = "{}";

/// Settings shared by every worker in a run
pub struct WorkerContext {
    pub base_dir: PathBuf,
    /// Absolute directory the generated configs are written to
    pub config_build_dir: PathBuf,
    pub run_worker: String,
    pub hooks: Hooks,
    pub selectors: Selectors,
    /// Text of the original suite configuration
    pub suite_xml: String,
    pub bootstrap: Option<String>,
    pub env: ParallelEnv,
    pub output: Arc<dyn Output>,
}

/// One worker and its assigned tests
pub struct Worker {
    pub id: usize,
    pub tests: Vec<TestFile>,
    ctx: Arc<WorkerContext>,
}

/// Removes the generated config when dropped, including on cancellation
struct ConfigGuard(PathBuf);

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            debug!("Failed to remove {}: {}", self.0.display(), e);
        }
    }
}

impl Worker {
    pub fn new(bucket: WorkerBucket, ctx: Arc<WorkerContext>) -> Self {
        Self {
            id: bucket.worker_id,
            tests: bucket.tests,
            ctx,
        }
    }

    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    /// Path of this worker's generated suite configuration
    pub fn config_path(&self) -> PathBuf {
        self.ctx
            .config_build_dir
            .join(format!("worker-{}.xml", self.id))
    }

    /// Run the before-worker hook, then the test runner
    pub async fn run(&self) -> Result<(), WorkerError> {
        if let Some(command) = &self.ctx.hooks.before_worker {
            self.hook(command)
                .kill_on_drop()
                .run()
                .await
                .map_err(WorkerError::BeforeHook)?;
        }

        let config_path = self.build_config()?;
        let _guard = ConfigGuard(config_path.clone());

        self.run_tests(&config_path).await
    }

    /// Run the after-worker hook, if one is configured
    pub async fn run_after_hook(&self) -> Result<(), HookError> {
        match &self.ctx.hooks.after_worker {
            Some(command) => self.hook(command).run().await,
            None => Ok(()),
        }
    }

    fn hook(&self, command: &str) -> Hook {
        Hook::new(command, &self.ctx.base_dir)
            .with_env(self.ctx.env.worker_vars(self.id))
            .own_process_group()
    }

    /// Write the worker's suite configuration and return its path
    pub fn build_config(&self) -> Result<PathBuf, WorkerError> {
        let path = self.config_path();
        let config_dir = &self.ctx.config_build_dir;

        let mut xml = TESTSUITES
            .replace(&self.ctx.suite_xml, NoExpand(&self.render_testsuites()))
            .into_owned();

        if let Some(bootstrap) = &self.ctx.bootstrap {
            let target = relative_path(config_dir, &self.ctx.base_dir.join(bootstrap));
            let attr = format!(
                "bootstrap=\"{}\"",
                quick_xml::escape::escape(&*target.to_string_lossy())
            );
            xml = BOOTSTRAP.replacen(&xml, 1, NoExpand(&attr)).into_owned();
        }

        let config_err = |source| WorkerError::Config {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(config_err)?;
        std::fs::write(&path, xml).map_err(config_err)?;

        debug!("Worker {} config written to {}", self.id, path.display());
        Ok(path)
    }

    /// `<testsuites>` element listing this worker's files by suite
    fn render_testsuites(&self) -> String {
        let mut suites: Vec<(&str, Vec<&TestFile>)> = Vec::new();
        for test in &self.tests {
            match suites.iter_mut().find(|(name, _)| *name == test.suite) {
                Some((_, files)) => files.push(test),
                None => suites.push((test.suite.as_str(), vec![test])),
            }
        }

        let mut out = String::from("<testsuites>\n");
        for (name, files) in suites {
            out.push_str(&format!(
                "    <testsuite name=\"{}\">\n",
                quick_xml::escape::escape(name)
            ));
            for file in files {
                let rel = relative_path(&self.ctx.config_build_dir, &file.path);
                out.push_str(&format!(
                    "      <file>{}</file>\n",
                    quick_xml::escape::escape(&*rel.to_string_lossy())
                ));
            }
            out.push_str("    </testsuite>\n");
        }
        out.push_str("  </testsuites>");
        out
    }

    /// Runner arguments for a config path
    pub fn runner_args(&self, config_path: &Path) -> Vec<String> {
        let config_arg = config_path
            .strip_prefix(&self.ctx.base_dir)
            .unwrap_or(config_path);

        let mut args = vec![
            "--configuration".to_string(),
            config_arg.to_string_lossy().into_owned(),
            "--teamcity".to_string(),
        ];
        args.extend(self.ctx.selectors.to_args());
        args
    }

    /// Build the test runner command from the run command template
    pub fn command(&self, config_path: &Path) -> Command {
        let args = self.runner_args(config_path);
        let template = self.ctx.run_worker.trim();

        let mut cmd = if template.contains(ARGS_PLACEHOLDER) {
            let joined = args.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" ");
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(template.replace(ARGS_PLACEHOLDER, &joined));
            cmd
        } else if template.contains(' ') {
            let joined = args.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" ");
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(format!("{template} {joined}"));
            cmd
        } else {
            let mut cmd = Command::new(template);
            cmd.args(&args);
            cmd
        };

        cmd.current_dir(&self.ctx.base_dir)
            .envs(self.ctx.env.worker_vars(self.id))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run_tests(&self, config_path: &Path) -> Result<(), WorkerError> {
        let mut child = self
            .command(config_path)
            .spawn()
            .map_err(WorkerError::Spawn)?;

        let stderr = child.stderr.take().map(|stderr| tokio::spawn(tail(stderr)));

        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                let n = reader
                    .read_until(b'\n', &mut buf)
                    .await
                    .map_err(WorkerError::Io)?;
                if n == 0 {
                    break;
                }
                let line = String::from_utf8_lossy(&buf);
                self.ctx
                    .output
                    .worker_line(self.id, line.trim_end_matches(['\n', '\r']));
            }
        }

        let status = child.wait().await.map_err(WorkerError::Io)?;

        let stderr_tail = match stderr {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                warn!("Worker {} stderr reader failed: {}", self.id, e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        if !status.success() {
            return Err(WorkerError::Exited {
                status,
                stderr_tail,
            });
        }

        Ok(())
    }
}

/// Keep the last lines written to a stream
async fn tail<R: AsyncRead + Unpin>(stream: R) -> Vec<String> {
    let mut lines = BufReader::new(stream).lines();
    let mut kept = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        if kept.len() == STDERR_TAIL_LINES {
            kept.pop_front();
        }
        kept.push_back(line);
    }

    kept.into()
}

/// Quote an argument for `sh` when it contains anything but safe characters
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));

    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Path to `to` written relative to the directory `from`.
///
/// Both paths should be absolute; when they share no root, `to` is
/// returned unchanged.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to_parts: Vec<Component> = to.components().collect();

    let common = from
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    if common == 0 {
        return to.to_path_buf();
    }

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for part in &to_parts[common..] {
        rel.push(part.as_os_str());
    }
    rel
}
