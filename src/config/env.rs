//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Environment variable prefix
const ENV_PREFIX: &str = "PHPUNIT_PARALLEL";

/// Configuration overrides read from the environment
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvConfig {
    /// Workers from PHPUNIT_PARALLEL_WORKERS
    pub workers: Option<usize>,
    /// Build dir from PHPUNIT_PARALLEL_CONFIG_BUILD_DIR
    pub config_build_dir: Option<String>,
    /// Run command from PHPUNIT_PARALLEL_RUN_WORKER
    pub run_worker: Option<String>,
    /// Suffix from PHPUNIT_PARALLEL_TEST_SUFFIX
    pub test_suffix: Option<String>,
    /// Runner config file from PHPUNIT_PARALLEL_RUNNER_CONFIG
    pub runner_config: Option<PathBuf>,
    /// Log filter from PHPUNIT_PARALLEL_LOG
    pub log: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables.
    ///
    /// A set but unparsable value is an error rather than silently ignored.
    pub fn load() -> Result<Self> {
        Ok(Self {
            workers: get_env_parse("WORKERS")?,
            config_build_dir: get_env("CONFIG_BUILD_DIR"),
            run_worker: get_env("RUN_WORKER"),
            test_suffix: get_env("TEST_SUFFIX"),
            runner_config: get_env("RUNNER_CONFIG").map(PathBuf::from),
            log: get_env("LOG"),
        })
    }
}

/// Environment variable name for a setting
pub fn var_name(name: &str) -> String {
    format!("{ENV_PREFIX}_{name}")
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(var_name(name)).ok().filter(|v| !v.is_empty())
}

/// Get environment variable and parse to type
fn get_env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get_env(name)
        .map(|v| {
            v.trim()
                .parse()
                .with_context(|| format!("Invalid {} value: {v:?}", var_name(name)))
        })
        .transpose()
}

/// Builder for setting environment variables in tests
#[cfg(test)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

#[cfg(test)]
impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    pub fn set(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((var_name(name), value.into()));
        self
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        for (key, value) in self.vars {
            env::set_var(key, value);
        }

        EnvGuard { previous }
    }
}

/// Guard that restores environment variables on drop
#[cfg(test)]
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}
