//! Passthrough replay of worker output
//!
//! Each worker's suites are buffered until they close so that interleaved
//! output from concurrent workers still reads as well-formed nested suites.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{LazyLock, Mutex};

use regex::Regex;

use super::{format_message, ServiceMessage, Tag, PREFIX};

/// Suites whose name ends with this are configuration containers, not
/// real test suites
pub const CONTAINER_SUFFIX: &str = ".xml";

static FLOW_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" flowId='(?:[^'|]|\|.)*'").expect("valid regex"));

#[derive(Debug, Default)]
struct OpenSuite {
    lines: Vec<String>,
    has_tests: bool,
}

impl OpenSuite {
    /// Lines kept when the suite is suppressed
    fn into_plain_lines(mut self) -> Vec<String> {
        self.lines.retain(|line| !line.starts_with(PREFIX));
        self.lines
    }
}

#[derive(Debug, Default)]
struct WorkerBuffer {
    suites: Vec<OpenSuite>,
    /// Suites whose framing lines were skipped, with nesting depth
    skipped: HashMap<String, usize>,
}

struct ReplayState<W> {
    sink: W,
    workers: HashMap<usize, WorkerBuffer>,
    /// Suite name -> worker that first opened it
    owners: HashMap<String, usize>,
}

impl<W: Write> ReplayState<W> {
    fn emit(&mut self, lines: &[String]) -> io::Result<()> {
        for line in lines {
            writeln!(self.sink, "{line}")?;
        }
        self.sink.flush()
    }
}

/// Re-emits worker output as a single coherent service message stream
pub struct ReplayAggregator<W: Write> {
    state: Mutex<ReplayState<W>>,
}

impl<W: Write> ReplayAggregator<W> {
    pub fn new(sink: W) -> Self {
        Self {
            state: Mutex::new(ReplayState {
                sink,
                workers: HashMap::new(),
                owners: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReplayState<W>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reset the buffer for a worker that is about to produce output
    pub fn worker_started(&self, worker_id: usize) {
        self.lock().workers.insert(worker_id, WorkerBuffer::default());
    }

    /// Feed one output line from a worker.
    pub fn push_line(&self, worker_id: usize, line: &str) -> io::Result<()> {
        let mut state = self.lock();

        if !line.starts_with(PREFIX) {
            return Self::buffer(&mut state, worker_id, line.to_string());
        }

        let clean = FLOW_ID.replace_all(line, "").into_owned();
        let msg = ServiceMessage::parse(line);
        let tag = msg.as_ref().and_then(|m| m.tag());
        let name = msg
            .as_ref()
            .map(|m| m.attr_or_empty("name"))
            .unwrap_or_default();

        match tag {
            Some(Tag::SuiteStarted) => {
                let owner = *state.owners.entry(name.clone()).or_insert(worker_id);
                let buffer = state.workers.entry(worker_id).or_default();

                if name.ends_with(CONTAINER_SUFFIX) || owner != worker_id {
                    *buffer.skipped.entry(name).or_default() += 1;
                    return Ok(());
                }

                buffer.suites.push(OpenSuite {
                    lines: vec![clean],
                    has_tests: false,
                });
                Ok(())
            }
            Some(Tag::SuiteFinished) => {
                let buffer = state.workers.entry(worker_id).or_default();

                if let Some(depth) = buffer.skipped.get_mut(&name) {
                    *depth -= 1;
                    if *depth == 0 {
                        buffer.skipped.remove(&name);
                    }
                    return Ok(());
                }

                let Some(mut suite) = buffer.suites.pop() else {
                    return Ok(());
                };
                if !suite.has_tests {
                    let mut plain = suite.into_plain_lines();
                    return match buffer.suites.last_mut() {
                        Some(parent) => {
                            parent.lines.append(&mut plain);
                            Ok(())
                        }
                        None if plain.is_empty() => Ok(()),
                        None => state.emit(&plain),
                    };
                }

                suite.lines.push(clean);
                match buffer.suites.last_mut() {
                    Some(parent) => {
                        parent.lines.append(&mut suite.lines);
                        parent.has_tests = true;
                        Ok(())
                    }
                    None => state.emit(&suite.lines),
                }
            }
            Some(Tag::TestStarted) => {
                if let Some(suite) = state
                    .workers
                    .entry(worker_id)
                    .or_default()
                    .suites
                    .last_mut()
                {
                    suite.has_tests = true;
                }
                Self::buffer(&mut state, worker_id, clean)
            }
            _ => Self::buffer(&mut state, worker_id, clean),
        }
    }

    fn buffer(state: &mut ReplayState<W>, worker_id: usize, line: String) -> io::Result<()> {
        match state
            .workers
            .entry(worker_id)
            .or_default()
            .suites
            .last_mut()
        {
            Some(suite) => {
                suite.lines.push(line);
                Ok(())
            }
            None => state.emit(&[line]),
        }
    }

    /// Flush any suites a worker left open that contain tests.
    pub fn worker_completed(&self, worker_id: usize) -> io::Result<()> {
        Self::flush_worker(&mut self.lock(), worker_id)
    }

    /// Flush every worker still holding buffered output, in worker order.
    /// Used when a run is cut short and workers never complete.
    pub fn flush_all(&self) -> io::Result<()> {
        let mut state = self.lock();
        let mut ids: Vec<usize> = state.workers.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            Self::flush_worker(&mut state, id)?;
        }
        Ok(())
    }

    fn flush_worker(state: &mut ReplayState<W>, worker_id: usize) -> io::Result<()> {
        let Some(mut buffer) = state.workers.remove(&worker_id) else {
            return Ok(());
        };

        let mut carried: Vec<String> = Vec::new();
        let mut has_tests = false;
        while let Some(mut suite) = buffer.suites.pop() {
            suite.lines.append(&mut carried);
            has_tests |= suite.has_tests;
            carried = if has_tests {
                suite.lines
            } else {
                suite.into_plain_lines()
            };
        }

        if carried.is_empty() {
            return Ok(());
        }
        state.emit(&carried)
    }

    /// Emit a worker failure as an error message record.
    pub fn worker_failed(&self, worker_id: usize, error: &str) -> io::Result<()> {
        let line = format_message(
            "message",
            &[
                ("text", &format!("Worker {worker_id} failed")),
                ("errorDetails", error),
                ("status", "ERROR"),
            ],
        );
        self.lock().emit(&[line])
    }

    #[cfg(test)]
    fn into_sink(self) -> W {
        self.state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay(lines: &[(usize, &str)]) -> Vec<String> {
        let agg = ReplayAggregator::new(Vec::new());
        let mut workers: Vec<usize> = lines.iter().map(|(w, _)| *w).collect();
        workers.sort_unstable();
        workers.dedup();
        for w in &workers {
            agg.worker_started(*w);
        }
        for (w, line) in lines {
            agg.push_line(*w, line).unwrap();
        }
        for w in &workers {
            agg.worker_completed(*w).unwrap();
        }
        String::from_utf8(agg.into_sink())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_empty_suite_is_suppressed() {
        let out = replay(&[
            (0, "##teamcity[testSuiteStarted name='Empty' flowId='1']"),
            (0, "##teamcity[testSuiteFinished name='Empty' flowId='1']"),
        ]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_nested_suite_emitted_in_order_without_flow_id() {
        let out = replay(&[
            (0, "##teamcity[testSuiteStarted name='Outer' flowId='1']"),
            (0, "##teamcity[testSuiteStarted name='Inner' flowId='1']"),
            (0, "##teamcity[testStarted name='t' flowId='1']"),
            (0, "##teamcity[testFinished name='t' flowId='1']"),
            (0, "##teamcity[testSuiteFinished name='Inner' flowId='1']"),
            (0, "##teamcity[testSuiteFinished name='Outer' flowId='1']"),
        ]);
        assert_eq!(
            out,
            vec![
                "##teamcity[testSuiteStarted name='Outer']",
                "##teamcity[testSuiteStarted name='Inner']",
                "##teamcity[testStarted name='t']",
                "##teamcity[testFinished name='t']",
                "##teamcity[testSuiteFinished name='Inner']",
                "##teamcity[testSuiteFinished name='Outer']",
            ]
        );
    }

    #[test]
    fn test_container_suite_framing_skipped() {
        let out = replay(&[
            (0, "##teamcity[testSuiteStarted name='/app/phpunit.xml']"),
            (0, "##teamcity[testSuiteStarted name='Unit']"),
            (0, "##teamcity[testStarted name='t']"),
            (0, "##teamcity[testFinished name='t']"),
            (0, "##teamcity[testSuiteFinished name='Unit']"),
            (0, "##teamcity[testSuiteFinished name='/app/phpunit.xml']"),
        ]);
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|l| !l.contains("phpunit.xml")));
    }

    #[test]
    fn test_suite_reopened_by_other_worker_is_skipped() {
        let out = replay(&[
            (0, "##teamcity[testSuiteStarted name='Unit']"),
            (1, "##teamcity[testSuiteStarted name='Unit']"),
            (1, "##teamcity[testSuiteStarted name='FooTest']"),
            (1, "##teamcity[testStarted name='b']"),
            (1, "##teamcity[testFinished name='b']"),
            (1, "##teamcity[testSuiteFinished name='FooTest']"),
            (1, "##teamcity[testSuiteFinished name='Unit']"),
            (0, "##teamcity[testStarted name='a']"),
            (0, "##teamcity[testFinished name='a']"),
            (0, "##teamcity[testSuiteFinished name='Unit']"),
        ]);

        let unit_starts = out
            .iter()
            .filter(|l| l.contains("testSuiteStarted name='Unit'"))
            .count();
        assert_eq!(unit_starts, 1);
        assert_eq!(out[0], "##teamcity[testSuiteStarted name='FooTest']");
        assert_eq!(out.len(), 4 + 4);
    }

    #[test]
    fn test_non_protocol_lines_pass_through() {
        let out = replay(&[
            (0, "PHPUnit 11.0.0 by Sebastian Bergmann and contributors."),
            (0, "##teamcity[testCount count='3' flowId='5']"),
        ]);
        assert_eq!(
            out,
            vec![
                "PHPUnit 11.0.0 by Sebastian Bergmann and contributors.",
                "##teamcity[testCount count='3']",
            ]
        );
    }

    #[test]
    fn test_plain_lines_survive_suppressed_suite() {
        let out = replay(&[
            (0, "##teamcity[testSuiteStarted name='Outer']"),
            (0, "##teamcity[testSuiteStarted name='Empty']"),
            (0, "PHP Warning:  Undefined variable $x"),
            (0, "##teamcity[testSuiteFinished name='Empty']"),
            (0, "##teamcity[testSuiteFinished name='Outer']"),
            (1, "##teamcity[testSuiteStarted name='Open']"),
            (1, "Deprecated: strlen(): Passing null"),
        ]);
        assert_eq!(
            out,
            vec![
                "PHP Warning:  Undefined variable $x",
                "Deprecated: strlen(): Passing null",
            ]
        );
    }

    #[test]
    fn test_open_suites_flushed_on_completion() {
        let out = replay(&[
            (0, "##teamcity[testSuiteStarted name='Outer']"),
            (0, "##teamcity[testSuiteStarted name='Inner']"),
            (0, "##teamcity[testStarted name='t']"),
        ]);
        assert_eq!(
            out,
            vec![
                "##teamcity[testSuiteStarted name='Outer']",
                "##teamcity[testSuiteStarted name='Inner']",
                "##teamcity[testStarted name='t']",
            ]
        );
    }

    #[test]
    fn test_interleaved_workers_keep_suites_whole() {
        let out = replay(&[
            (0, "##teamcity[testSuiteStarted name='A']"),
            (1, "##teamcity[testSuiteStarted name='B']"),
            (0, "##teamcity[testStarted name='a']"),
            (1, "##teamcity[testStarted name='b']"),
            (1, "##teamcity[testFinished name='b']"),
            (0, "##teamcity[testFinished name='a']"),
            (1, "##teamcity[testSuiteFinished name='B']"),
            (0, "##teamcity[testSuiteFinished name='A']"),
        ]);
        assert_eq!(
            out,
            vec![
                "##teamcity[testSuiteStarted name='B']",
                "##teamcity[testStarted name='b']",
                "##teamcity[testFinished name='b']",
                "##teamcity[testSuiteFinished name='B']",
                "##teamcity[testSuiteStarted name='A']",
                "##teamcity[testStarted name='a']",
                "##teamcity[testFinished name='a']",
                "##teamcity[testSuiteFinished name='A']",
            ]
        );
    }

    #[test]
    fn test_flush_all_drains_interrupted_workers() {
        let agg = ReplayAggregator::new(Vec::new());
        for w in [1, 0] {
            agg.worker_started(w);
            agg.push_line(w, &format!("##teamcity[testSuiteStarted name='S{w}']"))
                .unwrap();
            agg.push_line(w, &format!("##teamcity[testStarted name='t{w}']"))
                .unwrap();
        }
        agg.flush_all().unwrap();
        agg.flush_all().unwrap();

        let out = String::from_utf8(agg.into_sink()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "##teamcity[testSuiteStarted name='S0']",
                "##teamcity[testStarted name='t0']",
                "##teamcity[testSuiteStarted name='S1']",
                "##teamcity[testStarted name='t1']",
            ]
        );
    }

    #[test]
    fn test_worker_failure_record() {
        let agg = ReplayAggregator::new(Vec::new());
        agg.worker_failed(2, "exit status: 255").unwrap();
        let out = String::from_utf8(agg.into_sink()).unwrap();
        assert_eq!(
            out.trim_end(),
            "##teamcity[message text='Worker 2 failed' errorDetails='exit status: 255' status='ERROR']"
        );
    }
}
