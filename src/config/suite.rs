//! PHPUnit suite configuration
//!
//! Reads the `<testsuites>` declarations and bootstrap path out of
//! `phpunit.xml`. The raw document is kept so workers can rewrite it.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Suite configuration looked up when none is given explicitly
pub const DEFAULT_SUITE_CONFIG: &str = "phpunit.xml";

/// Fallback when the default does not exist
pub const FALLBACK_SUITE_CONFIG: &str = "phpunit.xml.dist";

/// A parsed suite configuration
#[derive(Clone, Debug)]
pub struct SuiteConfig {
    /// Path the configuration was read from
    pub path: PathBuf,
    /// Declared `bootstrap` attribute, as written
    pub bootstrap: Option<String>,
    pub suites: Vec<TestSuite>,
    /// Original document text
    pub raw_xml: String,
}

/// One `<testsuite>` declaration
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TestSuite {
    pub name: String,
    pub directories: Vec<SuiteDirectory>,
    pub files: Vec<String>,
    pub excludes: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SuiteDirectory {
    pub path: String,
    /// Per-directory file suffix, overriding the configured test suffix
    pub suffix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhpUnitXml {
    #[serde(rename = "@bootstrap", default)]
    bootstrap: Option<String>,
    #[serde(default)]
    testsuites: Option<TestSuitesXml>,
}

#[derive(Debug, Deserialize)]
struct TestSuitesXml {
    #[serde(default)]
    testsuite: Vec<TestSuiteXml>,
}

#[derive(Debug, Deserialize)]
struct TestSuiteXml {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(default)]
    directory: Vec<DirectoryXml>,
    #[serde(default)]
    file: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DirectoryXml {
    #[serde(rename = "@suffix", default)]
    suffix: Option<String>,
    #[serde(rename = "$text", default)]
    path: String,
}

impl SuiteConfig {
    /// Load and parse a suite configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read suite config: {}", path.display()))?;
        Self::parse(path, raw)
    }

    /// Parse a suite configuration from its text
    pub fn parse(path: impl Into<PathBuf>, raw_xml: String) -> Result<Self> {
        let path = path.into();
        let doc: PhpUnitXml = quick_xml::de::from_str(&raw_xml)
            .with_context(|| format!("Failed to parse suite config: {}", path.display()))?;

        let suites = doc
            .testsuites
            .map(|ts| ts.testsuite)
            .unwrap_or_default()
            .into_iter()
            .map(|suite| TestSuite {
                name: suite.name,
                directories: suite
                    .directory
                    .into_iter()
                    .filter(|d| !d.path.trim().is_empty())
                    .map(|d| SuiteDirectory {
                        path: d.path.trim().to_string(),
                        suffix: d.suffix.filter(|s| !s.is_empty()),
                    })
                    .collect(),
                files: trimmed(suite.file),
                excludes: trimmed(suite.exclude),
            })
            .collect();

        Ok(Self {
            path,
            bootstrap: doc.bootstrap.filter(|b| !b.is_empty()),
            suites,
            raw_xml,
        })
    }

    /// Directory all suite paths are relative to
    pub fn base_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

fn trimmed(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Pick the suite configuration in `dir`: `phpunit.xml`, else
/// `phpunit.xml.dist` when only that one exists.
pub fn locate(dir: &Path) -> PathBuf {
    let primary = dir.join(DEFAULT_SUITE_CONFIG);
    let fallback = dir.join(FALLBACK_SUITE_CONFIG);
    if !primary.exists() && fallback.exists() {
        fallback
    } else {
        primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<phpunit xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
         bootstrap="vendor/autoload.php"
         colors="true">
    <testsuites>
        <testsuite name="Unit">
            <directory suffix="Test.php">tests/Unit</directory>
            <exclude>tests/Unit/Legacy</exclude>
        </testsuite>
        <testsuite name="Feature">
            <directory>tests/Feature</directory>
            <file>tests/Smoke/BootTest.php</file>
            <directory suffix="Spec.php">tests/Specs</directory>
        </testsuite>
    </testsuites>
    <source>
        <include>
            <directory>src</directory>
        </include>
    </source>
</phpunit>
"#;

    #[test]
    fn test_parse_suites() {
        let config = SuiteConfig::parse("phpunit.xml", SAMPLE.to_string()).unwrap();

        assert_eq!(config.bootstrap.as_deref(), Some("vendor/autoload.php"));
        assert_eq!(config.suites.len(), 2);

        let unit = &config.suites[0];
        assert_eq!(unit.name, "Unit");
        assert_eq!(
            unit.directories,
            vec![SuiteDirectory {
                path: "tests/Unit".into(),
                suffix: Some("Test.php".into()),
            }]
        );
        assert_eq!(unit.excludes, vec!["tests/Unit/Legacy"]);

        let feature = &config.suites[1];
        assert_eq!(feature.directories.len(), 2);
        assert_eq!(feature.directories[0].suffix, None);
        assert_eq!(feature.directories[1].path, "tests/Specs");
        assert_eq!(feature.files, vec!["tests/Smoke/BootTest.php"]);
    }

    #[test]
    fn test_parse_without_testsuites() {
        let config =
            SuiteConfig::parse("phpunit.xml", "<phpunit colors=\"true\"></phpunit>".into()).unwrap();
        assert!(config.suites.is_empty());
        assert!(config.bootstrap.is_none());
    }

    #[test]
    fn test_parse_invalid_xml() {
        assert!(SuiteConfig::parse("phpunit.xml", "<phpunit><testsuites>".into()).is_err());
    }

    #[test]
    fn test_base_dir() {
        let config = SuiteConfig::parse("/app/phpunit.xml", SAMPLE.into()).unwrap();
        assert_eq!(config.base_dir(), PathBuf::from("/app"));

        let config = SuiteConfig::parse("phpunit.xml", SAMPLE.into()).unwrap();
        assert_eq!(config.base_dir(), PathBuf::from("."));
    }

    #[test]
    fn test_locate_prefers_primary() {
        let dir = tempdir().unwrap();
        assert_eq!(locate(dir.path()), dir.path().join("phpunit.xml"));

        std::fs::write(dir.path().join("phpunit.xml.dist"), SAMPLE).unwrap();
        assert_eq!(locate(dir.path()), dir.path().join("phpunit.xml.dist"));

        std::fs::write(dir.path().join("phpunit.xml"), SAMPLE).unwrap();
        assert_eq!(locate(dir.path()), dir.path().join("phpunit.xml"));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phpunit.xml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = SuiteConfig::load(&path).unwrap();
        assert_eq!(config.raw_xml, SAMPLE);
        assert_eq!(config.base_dir(), dir.path());
    }
}
