//! Test distribution
//!
//! Partitions discovered test files into worker buckets.

use std::fmt;
use std::path::PathBuf;

/// A discovered test file and the suite it was declared in
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TestFile {
    pub path: PathBuf,
    pub suite: String,
}

impl TestFile {
    pub fn new(path: impl Into<PathBuf>, suite: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            suite: suite.into(),
        }
    }
}

impl fmt::Display for TestFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.path.display(), self.suite)
    }
}

/// The tests assigned to one worker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerBucket {
    pub worker_id: usize,
    pub tests: Vec<TestFile>,
}

impl WorkerBucket {
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

/// An ordered set of worker buckets
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Distribution {
    pub buckets: Vec<WorkerBucket>,
}

impl Distribution {
    /// Total number of tests across all buckets
    pub fn test_count(&self) -> usize {
        self.buckets.iter().map(|b| b.tests.len()).sum()
    }

    pub fn worker_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn worker_tests(&self, worker_id: usize) -> Option<&[TestFile]> {
        self.buckets.get(worker_id).map(|b| b.tests.as_slice())
    }

    /// Consume the distribution, keeping only buckets with at least one test
    pub fn non_empty(self) -> Vec<WorkerBucket> {
        self.buckets.into_iter().filter(|b| !b.is_empty()).collect()
    }
}

/// Round-robin partition: the i-th test goes to bucket `i % worker_count`.
///
/// A worker count of zero is treated as one. Discovery order is preserved
/// within each bucket, so identical input always yields identical buckets.
pub fn partition(tests: &[TestFile], worker_count: usize) -> Distribution {
    let worker_count = worker_count.max(1);

    let mut buckets: Vec<WorkerBucket> = (0..worker_count)
        .map(|worker_id| WorkerBucket {
            worker_id,
            tests: Vec::new(),
        })
        .collect();

    for (i, test) in tests.iter().enumerate() {
        buckets[i % worker_count].tests.push(test.clone());
    }

    Distribution { buckets }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn files(n: usize) -> Vec<TestFile> {
        (0..n)
            .map(|i| TestFile::new(format!("tests/T{i:02}Test.php"), "Unit"))
            .collect()
    }

    #[test]
    fn test_round_robin_ten_over_three() {
        let tests = files(10);
        let dist = partition(&tests, 3);

        let sizes: Vec<_> = dist.buckets.iter().map(|b| b.tests.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);

        let ids = |worker: usize| -> Vec<usize> {
            dist.worker_tests(worker)
                .unwrap()
                .iter()
                .map(|t| tests.iter().position(|x| x == t).unwrap())
                .collect()
        };
        assert_eq!(ids(0), vec![0, 3, 6, 9]);
        assert_eq!(ids(1), vec![1, 4, 7]);
        assert_eq!(ids(2), vec![2, 5, 8]);
    }

    #[test]
    fn test_zero_workers_treated_as_one() {
        let dist = partition(&files(4), 0);
        assert_eq!(dist.worker_count(), 1);
        assert_eq!(dist.test_count(), 4);
    }

    #[test]
    fn test_every_test_assigned_exactly_once() {
        for total in [0, 1, 2, 7, 16, 33] {
            let tests = files(total);
            for workers in 1..=8 {
                let dist = partition(&tests, workers);
                let mut seen: HashMap<&TestFile, usize> = HashMap::new();
                for bucket in &dist.buckets {
                    for test in &bucket.tests {
                        *seen.entry(test).or_default() += 1;
                    }
                }
                assert_eq!(seen.len(), total);
                assert!(seen.values().all(|&c| c == 1));

                let non_empty = dist.clone().non_empty();
                assert!(non_empty.len() <= workers);
                assert!(non_empty.iter().all(|b| !b.is_empty()));
            }
        }
    }

    #[test]
    fn test_partition_is_deterministic() {
        let tests = files(23);
        assert_eq!(partition(&tests, 5), partition(&tests, 5));
    }

    #[test]
    fn test_more_workers_than_tests() {
        let dist = partition(&files(2), 4);
        assert_eq!(dist.worker_count(), 4);
        let buckets = dist.non_empty();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[1].worker_id, 1);
    }

    #[test]
    fn test_worker_tests_out_of_range() {
        let dist = partition(&files(3), 2);
        assert_eq!(dist.worker_tests(1).map(<[TestFile]>::len), Some(1));
        assert!(dist.worker_tests(5).is_none());
    }
}
