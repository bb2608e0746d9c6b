#![forbid(unsafe_code)]

use once_cell::sync::Lazy;
use regex::Regex;

/// Classification of one slice of a log line. Styling is the frontend's
/// business; this module only says what each slice is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Text,
    Severity,
    Timestamp,
    IpAddr,
    TaskMarker,
    PlayMarker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span<'a> {
    pub text: &'a str,
    pub kind: SpanKind,
}

static MARKUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        (?P<task>TASK\s\[[^\]]*\])
        |
        (?P<play>PLAY\s\[[^\]]*\])
        |
        (?P<level>\b(?:INFO|WARNING|ERROR|CRITICAL|DEBUG|changed|ok|failed|skipped)\b)
        |
        (?P<ts>\b\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\b|\b\d{2}:\d{2}:\d{2}\b)
        |
        (?P<ip>\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b)
        ",
    )
    .unwrap()
});

/// Split one log line into typed spans: playbook task/play markers, severity
/// keywords, ISO or short timestamps, IPv4 addresses, plain text between.
pub fn annotate_line(line: &str) -> Vec<Span<'_>> {
    let mut out = Vec::new();
    let mut idx = 0usize;
    while let Some(caps) = MARKUP_RE.captures_at(line, idx) {
        let m = caps.get(0).unwrap();
        if m.start() > idx {
            out.push(Span {
                text: &line[idx..m.start()],
                kind: SpanKind::Text,
            });
        }
        let kind = if caps.name("task").is_some() {
            SpanKind::TaskMarker
        } else if caps.name("play").is_some() {
            SpanKind::PlayMarker
        } else if caps.name("level").is_some() {
            SpanKind::Severity
        } else if caps.name("ts").is_some() {
            SpanKind::Timestamp
        } else {
            SpanKind::IpAddr
        };
        out.push(Span {
            text: m.as_str(),
            kind,
        });
        idx = m.end();
        if idx >= line.len() {
            break;
        }
    }
    if idx < line.len() {
        out.push(Span {
            text: &line[idx..],
            kind: SpanKind::Text,
        });
    }
    out
}
