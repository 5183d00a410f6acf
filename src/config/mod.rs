//! Configuration module
//!
//! Resolves the runner configuration from defaults, the runner config file,
//! environment variables and command-line flags, in that order.

pub mod env;
pub mod file;
pub mod suite;

use std::path::{Path, PathBuf};

pub use env::EnvConfig;
pub use file::ConfigFile;
pub use suite::SuiteConfig;

/// Default directory for generated worker configs
pub const DEFAULT_CONFIG_BUILD_DIR: &str = ".phpunit-parallel";

/// Default test runner command
pub const DEFAULT_RUN_WORKER: &str = "vendor/bin/phpunit";

/// Default suffix for test files
pub const DEFAULT_TEST_SUFFIX: &str = "Test.php";

/// Shell commands run around the test run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Hooks {
    /// Once, before any worker starts
    pub before: Option<String>,
    /// In each worker, before its test runner
    pub before_worker: Option<String>,
    /// In each worker, during cleanup
    pub after_worker: Option<String>,
    /// Once, after everything else
    pub after: Option<String>,
}

/// Test selection flags forwarded to every test runner invocation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selectors {
    pub filter: Option<String>,
    pub group: Option<String>,
    pub exclude_group: Option<String>,
}

impl Selectors {
    pub fn is_empty(&self) -> bool {
        self.filter.is_none() && self.group.is_none() && self.exclude_group.is_none()
    }

    /// Runner arguments for the configured selectors
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (flag, value) in [
            ("--filter", &self.filter),
            ("--group", &self.group),
            ("--exclude-group", &self.exclude_group),
        ] {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value.clone());
            }
        }
        args
    }
}

/// Values given on the command line. `None` means "not given".
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub workers: Option<usize>,
    pub config_build_dir: Option<String>,
    pub run_worker: Option<String>,
    pub test_suffix: Option<String>,
    pub configuration: Option<PathBuf>,
    pub hooks: Hooks,
    pub selectors: Selectors,
}

/// Fully resolved runner configuration. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerConfig {
    pub workers: usize,
    pub config_build_dir: PathBuf,
    pub run_worker: String,
    pub test_suffix: String,
    /// Suite configuration path, when chosen explicitly
    pub configuration: Option<PathBuf>,
    pub hooks: Hooks,
    pub selectors: Selectors,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            config_build_dir: PathBuf::from(DEFAULT_CONFIG_BUILD_DIR),
            run_worker: DEFAULT_RUN_WORKER.to_string(),
            test_suffix: DEFAULT_TEST_SUFFIX.to_string(),
            configuration: None,
            hooks: Hooks::default(),
            selectors: Selectors::default(),
        }
    }
}

impl RunnerConfig {
    /// Layer a runner config file over the current values
    pub fn with_file(mut self, file: &ConfigFile) -> Self {
        set(&mut self.workers, file.workers);
        set(&mut self.config_build_dir, file.config_build_dir.as_deref().map(PathBuf::from));
        set(&mut self.run_worker, file.run_worker.clone());
        set(&mut self.test_suffix, file.test_suffix.clone());
        if let Some(configuration) = &file.configuration {
            self.configuration = Some(PathBuf::from(configuration));
        }
        set_opt(&mut self.hooks.before, &file.before);
        set_opt(&mut self.hooks.before_worker, &file.before_worker);
        set_opt(&mut self.hooks.after_worker, &file.after_worker);
        set_opt(&mut self.hooks.after, &file.after);
        self
    }

    /// Layer environment variables over the current values
    pub fn with_env(mut self, env: &EnvConfig) -> Self {
        set(&mut self.workers, env.workers);
        set(&mut self.config_build_dir, env.config_build_dir.as_deref().map(PathBuf::from));
        set(&mut self.run_worker, env.run_worker.clone());
        set(&mut self.test_suffix, env.test_suffix.clone());
        self
    }

    /// Layer command-line flags over the current values
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        set(&mut self.workers, overrides.workers);
        set(&mut self.config_build_dir, overrides.config_build_dir.map(PathBuf::from));
        set(&mut self.run_worker, overrides.run_worker);
        set(&mut self.test_suffix, overrides.test_suffix);
        if overrides.configuration.is_some() {
            self.configuration = overrides.configuration;
        }
        set_opt(&mut self.hooks.before, &overrides.hooks.before);
        set_opt(&mut self.hooks.before_worker, &overrides.hooks.before_worker);
        set_opt(&mut self.hooks.after_worker, &overrides.hooks.after_worker);
        set_opt(&mut self.hooks.after, &overrides.hooks.after);
        self.selectors = overrides.selectors;
        self
    }

    /// Suite configuration to load: the explicit one, else the default
    /// lookup in `cwd`
    pub fn suite_config_path(&self, cwd: &Path) -> PathBuf {
        match &self.configuration {
            Some(path) => path.clone(),
            None => suite::locate(cwd),
        }
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn set_opt(slot: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value.as_ref().filter(|v| !v.trim().is_empty()) {
        *slot = Some(value.clone());
    }
}

/// Available parallelism, or one when it cannot be determined
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
