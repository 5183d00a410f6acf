//! TeamCity service message protocol
//!
//! PHPUnit's `--teamcity` printer emits one record per line:
//!
//! ```text
//! ##teamcity[testFailed name='testAdd' message='Failed asserting that 3 is 4.' flowId='4242']
//! ```
//!
//! Values are single-quoted and use `|` as the escape character. This module
//! parses single records; [`decode`] turns them into typed events for the
//! dashboard and [`replay`] re-emits them for CI tooling.

pub mod decode;
pub mod replay;

pub use decode::{decode, EventKind, ProtocolEvent};
pub use replay::ReplayAggregator;

/// Prefix carried by every service message line
pub const PREFIX: &str = "##teamcity[";

/// Service message tags the engine understands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    SuiteStarted,
    SuiteFinished,
    TestStarted,
    TestFinished,
    TestFailed,
    TestIgnored,
    TestCount,
}

impl Tag {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "testSuiteStarted" => Some(Tag::SuiteStarted),
            "testSuiteFinished" => Some(Tag::SuiteFinished),
            "testStarted" => Some(Tag::TestStarted),
            "testFinished" => Some(Tag::TestFinished),
            "testFailed" => Some(Tag::TestFailed),
            "testIgnored" => Some(Tag::TestIgnored),
            "testCount" => Some(Tag::TestCount),
            _ => None,
        }
    }
}

/// A parsed `##teamcity[...]` record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceMessage<'a> {
    pub name: &'a str,
    attrs: Vec<(&'a str, String)>,
}

impl<'a> ServiceMessage<'a> {
    /// Parse a line, returning `None` when it is not a service message.
    ///
    /// Parsing is lenient: an attribute value missing its closing quote runs
    /// to the end of the line, and anything after it is ignored.
    pub fn parse(line: &'a str) -> Option<Self> {
        let body = line.trim_end_matches(['\r', '\n']).strip_prefix(PREFIX)?;

        let name_end = body
            .find(|c: char| c == ' ' || c == ']')
            .unwrap_or(body.len());
        let name = &body[..name_end];
        if name.is_empty() {
            return None;
        }

        let mut attrs = Vec::new();
        let mut rest = &body[name_end..];

        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() || rest.starts_with(']') {
                break;
            }

            let Some(eq) = rest.find("='") else {
                break;
            };
            let key = &rest[..eq];
            if key.contains(' ') {
                break;
            }

            let value_start = eq + 2;
            let value_len = quoted_len(&rest[value_start..]);
            let raw = &rest[value_start..value_start + value_len];
            attrs.push((key, unescape(raw)));

            // Skip past the closing quote when present.
            let consumed = (value_start + value_len + 1).min(rest.len());
            rest = &rest[consumed..];
        }

        Some(Self { name, attrs })
    }

    pub fn tag(&self) -> Option<Tag> {
        Tag::from_name(self.name)
    }

    /// Decoded value of an attribute
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Decoded value of an attribute, or an empty string
    pub fn attr_or_empty(&self, key: &str) -> String {
        self.attr(key).unwrap_or_default().to_string()
    }
}

/// Length of a quoted value up to (not including) the first unescaped `'`.
fn quoted_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'|' => i += 2,
            b'\'' => return i,
            _ => i += 1,
        }
    }
    s.len()
}

/// Decode a raw attribute value.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '|' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('\'') => out.push('\''),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('|') => out.push('|'),
            Some('[') => out.push('['),
            Some(']') => out.push(']'),
            Some('0') => {
                let rest = chars.as_str();
                match rest
                    .strip_prefix('x')
                    .and_then(|hex| hex.get(..4))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .and_then(char::from_u32)
                {
                    Some(decoded) => {
                        out.push(decoded);
                        chars = rest[5..].chars();
                    }
                    None => out.push_str("|0"),
                }
            }
            Some(other) => {
                out.push('|');
                out.push(other);
            }
            None => out.push('|'),
        }
    }

    out
}

/// Encode a value for use inside a quoted attribute.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\'' => out.push_str("|'"),
            '\n' => out.push_str("|n"),
            '\r' => out.push_str("|r"),
            '|' => out.push_str("||"),
            '[' => out.push_str("|["),
            ']' => out.push_str("|]"),
            _ => out.push(c),
        }
    }
    out
}

/// Format a service message from a name and attribute pairs.
pub fn format_message(name: &str, attrs: &[(&str, &str)]) -> String {
    let mut line = format!("{PREFIX}{name}");
    for (key, value) in attrs {
        line.push_str(&format!(" {key}='{}'", escape(value)));
    }
    line.push(']');
    line
}
