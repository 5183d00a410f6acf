//! Runner configuration file
//!
//! Finds and loads `phpunit-parallel.{xml,yaml,yml,json}`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./phpunit-parallel.xml",
    "./phpunit-parallel.yaml",
    "./phpunit-parallel.yml",
    "./phpunit-parallel.json",
    "~/.config/phpunit-parallel/config.yaml",
];

/// Settings read from a runner configuration file.
///
/// Every field is optional; unset fields fall through to defaults. The XML
/// form uses a `<runner>` root with one child element per field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "runner", rename_all = "kebab-case", default)]
pub struct ConfigFile {
    /// Number of parallel workers
    pub workers: Option<usize>,

    /// Directory for generated worker configs
    pub config_build_dir: Option<String>,

    /// Test runner command template
    #[serde(alias = "run-command")]
    pub run_worker: Option<String>,

    /// Test file suffix
    pub test_suffix: Option<String>,

    /// Suite configuration to use instead of `phpunit.xml`
    pub configuration: Option<String>,

    pub before: Option<String>,
    pub before_worker: Option<String>,
    pub after_worker: Option<String>,
    pub after: Option<String>,
}

impl ConfigFile {
    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load configuration from file, choosing the format by extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read runner config: {}", path.display()))?;

        let config: Self = match Format::of(path) {
            Format::Yaml => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
            Format::Json => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            Format::Xml => quick_xml::de::from_str(&content)
                .with_context(|| format!("Failed to parse XML config: {}", path.display()))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load an explicit file, or the first one found in standard locations
    pub fn load_optional(explicit: Option<&Path>) -> Result<Option<(PathBuf, Self)>> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::find() {
                Some(path) => path,
                None => return Ok(None),
            },
        };

        let config = Self::load(&path)?;
        Ok(Some((path, config)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(command) = &self.run_worker {
            if command.trim().is_empty() {
                anyhow::bail!("run-worker must not be empty");
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
    Xml,
}

impl Format {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Format::Yaml,
            Some("json") => Format::Json,
            _ => Format::Xml,
        }
    }
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_xml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phpunit-parallel.xml");
        std::fs::write(
            &path,
            r#"<?xml version="1.0"?>
<runner>
    <workers>6</workers>
    <config-build-dir>build/parallel</config-build-dir>
    <run-command>docker compose exec php vendor/bin/phpunit</run-command>
    <after-worker>./scripts/drop-db.sh</after-worker>
</runner>"#,
        )
        .unwrap();

        let config = ConfigFile::load(&path).unwrap();
        assert_eq!(config.workers, Some(6));
        assert_eq!(config.config_build_dir.as_deref(), Some("build/parallel"));
        assert_eq!(
            config.run_worker.as_deref(),
            Some("docker compose exec php vendor/bin/phpunit")
        );
        assert_eq!(config.after_worker.as_deref(), Some("./scripts/drop-db.sh"));
        assert_eq!(config.before, None);
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phpunit-parallel.yaml");
        std::fs::write(&path, "workers: 3\ntest-suffix: Spec.php\nbefore: make db\n").unwrap();

        let config = ConfigFile::load(&path).unwrap();
        assert_eq!(config.workers, Some(3));
        assert_eq!(config.test_suffix.as_deref(), Some("Spec.php"));
        assert_eq!(config.before.as_deref(), Some("make db"));
    }

    #[test]
    fn test_load_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phpunit-parallel.json");
        std::fs::write(&path, r#"{"workers": 2, "run-worker": "php vendor/bin/phpunit"}"#).unwrap();

        let config = ConfigFile::load(&path).unwrap();
        assert_eq!(config.workers, Some(2));
        assert_eq!(config.run_worker.as_deref(), Some("php vendor/bin/phpunit"));
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let config = ConfigFile {
            run_worker: Some("   ".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_optional_missing_explicit_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(ConfigFile::load_optional(Some(&missing)).is_err());
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(Format::of(Path::new("a.yml")), Format::Yaml);
        assert_eq!(Format::of(Path::new("a.json")), Format::Json);
        assert_eq!(Format::of(Path::new("a.xml")), Format::Xml);
        assert_eq!(Format::of(Path::new("runner")), Format::Xml);
    }

    #[test]
    fn test_expand_path() {
        let path = expand_path("./test.yaml");
        assert_eq!(path, PathBuf::from("./test.yaml"));
    }
}
