//! Shell hooks and the parallel environment
//!
//! Every process the runner spawns sees `PARALLEL=1`, `PROJECT`,
//! `RUNNER_PID` and `WORKER_COUNT`; worker-scoped ones also get `WORKER_ID`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::HookError;

/// Environment shared by every spawned process in a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParallelEnv {
    pub project: String,
    pub runner_pid: u32,
    pub worker_count: usize,
}

impl ParallelEnv {
    pub fn new(base_dir: &Path, worker_count: usize) -> Self {
        let project = base_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            project,
            runner_pid: std::process::id(),
            worker_count,
        }
    }

    /// Variables for a global process
    pub fn vars(&self) -> Vec<(&'static str, String)> {
        vec![
            ("PARALLEL", "1".to_string()),
            ("PROJECT", self.project.clone()),
            ("RUNNER_PID", self.runner_pid.to_string()),
            ("WORKER_COUNT", self.worker_count.to_string()),
        ]
    }

    /// Variables for a process scoped to one worker
    pub fn worker_vars(&self, worker_id: usize) -> Vec<(&'static str, String)> {
        let mut vars = self.vars();
        vars.push(("WORKER_ID", worker_id.to_string()));
        vars
    }
}

/// A shell command run through `sh -c`
#[derive(Clone, Debug)]
pub struct Hook {
    command: String,
    dir: PathBuf,
    env: Vec<(&'static str, String)>,
    own_group: bool,
    inherit_output: bool,
    kill_on_drop: bool,
}

impl Hook {
    pub fn new(command: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            dir: dir.into(),
            env: Vec::new(),
            own_group: false,
            inherit_output: false,
            kill_on_drop: false,
        }
    }

    pub fn with_env(mut self, vars: Vec<(&'static str, String)>) -> Self {
        self.env = vars;
        self
    }

    /// Run in a new process group so terminal interrupts do not reach it
    pub fn own_process_group(mut self) -> Self {
        self.own_group = true;
        self
    }

    /// Share stdout and stderr with the runner instead of discarding them
    pub fn inherit_output(mut self) -> Self {
        self.inherit_output = true;
        self
    }

    /// Kill the hook if its future is dropped before it exits
    pub fn kill_on_drop(mut self) -> Self {
        self.kill_on_drop = true;
        self
    }

    /// Run the hook to completion
    pub async fn run(&self) -> Result<(), HookError> {
        debug!("Running hook: {}", self.command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .current_dir(&self.dir)
            .envs(self.env.iter().map(|(k, v)| (*k, v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(self.kill_on_drop);

        if self.inherit_output {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        #[cfg(unix)]
        {
            if self.own_group {
                cmd.process_group(0);
            }
        }

        let status = cmd.status().await.map_err(|source| HookError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        if !status.success() {
            return Err(HookError::Failed {
                command: self.command.clone(),
                status,
            });
        }

        Ok(())
    }
}
