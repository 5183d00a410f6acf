//! Structured decoding of service messages into typed events

use super::{ServiceMessage, Tag};

/// One decoded protocol record, tagged with the worker that produced it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolEvent {
    pub worker_id: usize,
    pub kind: EventKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    SuiteStarted {
        name: String,
    },
    SuiteFinished {
        name: String,
    },
    TestStarted {
        key: String,
        display_name: String,
    },
    TestFinished {
        key: String,
    },
    TestFailed {
        key: String,
        message: String,
        details: String,
    },
    TestSkipped {
        key: String,
        message: String,
    },
    CountReported {
        count: usize,
    },
}

/// Decode a single output line from a worker.
///
/// Lines that are not recognized service messages yield `None`.
pub fn decode(worker_id: usize, line: &str) -> Option<ProtocolEvent> {
    let msg = ServiceMessage::parse(line)?;

    let kind = match msg.tag()? {
        Tag::SuiteStarted => EventKind::SuiteStarted {
            name: msg.attr_or_empty("name"),
        },
        Tag::SuiteFinished => EventKind::SuiteFinished {
            name: msg.attr_or_empty("name"),
        },
        Tag::TestStarted => {
            let key = msg.attr_or_empty("name");
            let display_name = msg
                .attr("locationHint")
                .and_then(|hint| hint.rsplit_once("::"))
                .map(|(_, method)| method.to_string())
                .filter(|method| !method.is_empty())
                .unwrap_or_else(|| key.clone());
            EventKind::TestStarted { key, display_name }
        }
        Tag::TestFinished => EventKind::TestFinished {
            key: msg.attr_or_empty("name"),
        },
        Tag::TestFailed => EventKind::TestFailed {
            key: msg.attr_or_empty("name"),
            message: msg.attr_or_empty("message"),
            details: msg.attr_or_empty("details"),
        },
        Tag::TestIgnored => EventKind::TestSkipped {
            key: msg.attr_or_empty("name"),
            message: msg.attr_or_empty("message"),
        },
        Tag::TestCount => EventKind::CountReported {
            count: msg.attr("count")?.trim().parse().ok()?,
        },
    };

    Some(ProtocolEvent { worker_id, kind })
}
