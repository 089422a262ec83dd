//! nginx / apache combined access log parser
//!
//! ```text
//! 203.0.113.7 - - [26/Jan/2026:09:00:00 +0000] "GET /api/items HTTP/1.1" 500 42 "-" "curl/8.5"
//! ```
//!
//! Both formats share this grammar; the event keeps the declared name.
//! Severity is derived from the status code alone.

use chrono::{DateTime, Utc};
use regex::Regex;
use tailhub_core::types::{StructuredEvent, severity};

use super::{LogFormat, base_event, no_match};
use crate::collector::RawLine;
use crate::error::LogPipelineError;

pub(crate) const PATTERN: &str = r#"^(?P<remote>\S+) \S+ \S+ \[(?P<time>[^\]]+)\] "(?P<method>\S+) (?P<path>[^"]+) (?P<proto>[^"]+)" (?P<status>\d{3}) (?P<body>\d+|-) "(?P<referer>[^"]*)" "(?P<agent>[^"]*)""#;

const TIME_LAYOUT: &str = "%d/%b/%Y:%H:%M:%S %z";

pub(crate) fn parse(
    grammar: &Regex,
    format: LogFormat,
    raw: &RawLine,
) -> Result<StructuredEvent, LogPipelineError> {
    let format = format.as_str();
    let caps = grammar.captures(&raw.line).ok_or_else(|| no_match(format))?;
    let get = |name: &str| caps.name(name).map_or("", |m| m.as_str());

    let method = get("method");
    let path = get("path");
    let status = get("status");

    let mut event = base_event(raw, format);
    event.timestamp = parse_time(get("time"));
    event.severity = severity_from_status(status).to_owned();
    event.message = format!("{method} {path} {status}");
    event.fields = [
        ("remote_addr", get("remote")),
        ("method", method),
        ("path", path),
        ("protocol", get("proto")),
        ("status", status),
        ("bytes", get("body")),
        ("referer", get("referer")),
        ("user_agent", get("agent")),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect();

    Ok(event)
}

/// A malformed time leaves the timestamp unknown; the line still parses.
fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, TIME_LAYOUT)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn severity_from_status(status: &str) -> &'static str {
    match status.parse::<u16>() {
        Ok(code) if code >= 500 => severity::ERROR,
        Ok(code) if code >= 400 => severity::WARN,
        Ok(_) => severity::INFO,
        Err(_) => severity::UNKNOWN,
    }
}
