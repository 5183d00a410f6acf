//! Test file discovery
//!
//! Expands the suite configuration's `<directory>` and `<file>` entries into
//! concrete test files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::suite::{SuiteConfig, TestSuite};
use crate::distributor::TestFile;
use crate::error::DiscoveryError;

/// Paths excluded from one test suite
struct Excludes {
    prefixes: Vec<PathBuf>,
    globs: GlobSet,
}

impl Excludes {
    fn new(base_dir: &Path, entries: &[String]) -> Result<Self, DiscoveryError> {
        let mut builder = GlobSetBuilder::new();
        let mut prefixes = Vec::with_capacity(entries.len());

        for entry in entries {
            let full = base_dir.join(entry);
            let pattern = full.to_string_lossy().into_owned();
            let glob = Glob::new(&pattern).map_err(|source| DiscoveryError::Pattern {
                pattern: entry.clone(),
                source,
            })?;
            builder.add(glob);
            prefixes.push(full);
        }

        let globs = builder.build().map_err(|source| DiscoveryError::Pattern {
            pattern: entries.join(", "),
            source,
        })?;

        Ok(Self { prefixes, globs })
    }

    fn matches(&self, path: &Path) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix)) || self.globs.is_match(path)
    }
}

/// Collect every test file declared by the suite configuration.
///
/// Directories are walked in file-name order so the result is stable
/// between runs. A file declared more than once is kept at its first
/// position only.
pub fn discover(
    config: &SuiteConfig,
    base_dir: &Path,
    default_suffix: &str,
) -> Result<Vec<TestFile>, DiscoveryError> {
    let mut seen = HashSet::new();
    let mut tests = Vec::new();

    for suite in &config.suites {
        for test in discover_suite(suite, base_dir, default_suffix)? {
            if seen.insert(test.path.clone()) {
                tests.push(test);
            }
        }
    }

    debug!("Discovered {} test files", tests.len());
    Ok(tests)
}

fn discover_suite(
    suite: &TestSuite,
    base_dir: &Path,
    default_suffix: &str,
) -> Result<Vec<TestFile>, DiscoveryError> {
    let excludes = Excludes::new(base_dir, &suite.excludes)?;
    let mut tests = Vec::new();

    for directory in &suite.directories {
        let root = base_dir.join(&directory.path);
        if !root.is_dir() {
            return Err(DiscoveryError::MissingDirectory(root));
        }

        let suffix = directory.suffix.as_deref().unwrap_or(default_suffix);

        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !excludes.matches(entry.path()));

        for entry in walker {
            let entry = entry.map_err(|source| DiscoveryError::Walk {
                path: root.clone(),
                source,
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            if entry.file_name().to_string_lossy().ends_with(suffix) {
                tests.push(TestFile::new(entry.into_path(), &suite.name));
            }
        }
    }

    for file in &suite.files {
        let path = base_dir.join(file);
        if path.is_file() && !excludes.matches(&path) {
            tests.push(TestFile::new(path, &suite.name));
        } else {
            debug!("Skipping missing test file {}", path.display());
        }
    }

    Ok(tests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::suite::SuiteDirectory;
    use tempfile::tempdir;

    fn touch(base: &Path, rel: &str) {
        let path = base.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "<?php\n").unwrap();
    }

    fn config(suites: Vec<TestSuite>) -> SuiteConfig {
        SuiteConfig {
            path: PathBuf::from("phpunit.xml"),
            bootstrap: None,
            suites,
            raw_xml: String::new(),
        }
    }

    fn rel(base: &Path, tests: &[TestFile]) -> Vec<String> {
        tests
            .iter()
            .map(|t| t.path.strip_prefix(base).unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_walks_sorted_with_suffix() {
        let dir = tempdir().unwrap();
        let base = dir.path();
        touch(base, "tests/Unit/ZetaTest.php");
        touch(base, "tests/Unit/AlphaTest.php");
        touch(base, "tests/Unit/Nested/BetaTest.php");
        touch(base, "tests/Unit/Helper.php");

        let cfg = config(vec![TestSuite {
            name: "Unit".into(),
            directories: vec![SuiteDirectory {
                path: "tests/Unit".into(),
                suffix: None,
            }],
            ..Default::default()
        }]);

        let tests = discover(&cfg, base, "Test.php").unwrap();
        assert_eq!(
            rel(base, &tests),
            vec![
                "tests/Unit/AlphaTest.php",
                "tests/Unit/Nested/BetaTest.php",
                "tests/Unit/ZetaTest.php",
            ]
        );
        assert!(tests.iter().all(|t| t.suite == "Unit"));
    }

    #[test]
    fn test_directory_suffix_overrides_default() {
        let dir = tempdir().unwrap();
        let base = dir.path();
        touch(base, "specs/CartSpec.php");
        touch(base, "specs/CartTest.php");

        let cfg = config(vec![TestSuite {
            name: "Specs".into(),
            directories: vec![SuiteDirectory {
                path: "specs".into(),
                suffix: Some("Spec.php".into()),
            }],
            ..Default::default()
        }]);

        let tests = discover(&cfg, base, "Test.php").unwrap();
        assert_eq!(rel(base, &tests), vec!["specs/CartSpec.php"]);
    }

    #[test]
    fn test_excludes_prefix_and_glob() {
        let dir = tempdir().unwrap();
        let base = dir.path();
        touch(base, "tests/KeepTest.php");
        touch(base, "tests/Legacy/OldTest.php");
        touch(base, "tests/Slow/BigSlowTest.php");
        touch(base, "tests/Slow/QuickTest.php");

        let cfg = config(vec![TestSuite {
            name: "All".into(),
            directories: vec![SuiteDirectory {
                path: "tests".into(),
                suffix: None,
            }],
            excludes: vec!["tests/Legacy".into(), "tests/Slow/*Slow*".into()],
            ..Default::default()
        }]);

        let tests = discover(&cfg, base, "Test.php").unwrap();
        assert_eq!(
            rel(base, &tests),
            vec!["tests/KeepTest.php", "tests/Slow/QuickTest.php"]
        );
    }

    #[test]
    fn test_explicit_files_and_duplicates() {
        let dir = tempdir().unwrap();
        let base = dir.path();
        touch(base, "tests/Unit/ATest.php");
        touch(base, "tests/Smoke.php");

        let cfg = config(vec![
            TestSuite {
                name: "Unit".into(),
                directories: vec![SuiteDirectory {
                    path: "tests/Unit".into(),
                    suffix: None,
                }],
                ..Default::default()
            },
            TestSuite {
                name: "Extra".into(),
                files: vec![
                    "tests/Smoke.php".into(),
                    "tests/Missing.php".into(),
                    "tests/Unit/ATest.php".into(),
                ],
                ..Default::default()
            },
        ]);

        let tests = discover(&cfg, base, "Test.php").unwrap();
        assert_eq!(
            rel(base, &tests),
            vec!["tests/Unit/ATest.php", "tests/Smoke.php"]
        );
        assert_eq!(tests[0].suite, "Unit");
        assert_eq!(tests[1].suite, "Extra");
    }

    #[test]
    fn test_missing_directory_is_error() {
        let dir = tempdir().unwrap();
        let cfg = config(vec![TestSuite {
            name: "Unit".into(),
            directories: vec![SuiteDirectory {
                path: "nope".into(),
                suffix: None,
            }],
            ..Default::default()
        }]);

        let err = discover(&cfg, dir.path(), "Test.php").unwrap_err();
        assert!(matches!(err, DiscoveryError::MissingDirectory(_)));
    }
}
