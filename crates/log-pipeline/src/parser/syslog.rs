//! BSD syslog parser
//!
//! ```text
//! Jan 26 09:00:00 web-01 sshd[4242]: error: maximum authentication attempts exceeded
//! ```
//!
//! The grammar carries no year; the current calendar year is assumed and
//! the result is interpreted as UTC. Severity comes from a case-insensitive
//! scan of the message text.

use chrono::{DateTime, Month, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use tailhub_core::types::{StructuredEvent, severity};

use super::{base_event, no_match};
use crate::collector::RawLine;
use crate::error::LogPipelineError;

pub(crate) const PATTERN: &str = r"^(?P<month>[A-Z][a-z]{2})\s+(?P<day>\d{1,2})\s+(?P<time>\d{2}:\d{2}:\d{2})\s+(?P<host>\S+)\s+(?P<tag>[^:]+):\s*(?P<msg>.*)$";

const FORMAT: &str = "syslog";

pub(crate) fn parse(
    grammar: &Regex,
    raw: &RawLine,
    year: i32,
) -> Result<StructuredEvent, LogPipelineError> {
    let caps = grammar.captures(&raw.line).ok_or_else(|| no_match(FORMAT))?;
    let get = |name: &str| caps.name(name).map_or("", |m| m.as_str());

    let message = get("msg");
    let tag = get("tag");

    let mut event = base_event(raw, FORMAT);
    event.timestamp = parse_time(year, get("month"), get("day"), get("time"));
    event.severity = severity_from_message(message).to_owned();
    event.message = message.to_owned();
    event.fields.insert("host".to_owned(), get("host").to_owned());
    event.fields.insert("tag".to_owned(), tag.to_owned());
    if let Some(pid) = extract_pid(tag) {
        event.fields.insert("pid".to_owned(), pid.to_owned());
    }

    Ok(event)
}

/// `None` for impossible dates such as `Feb 30`.
fn parse_time(year: i32, month: &str, day: &str, clock: &str) -> Option<DateTime<Utc>> {
    let month = month.parse::<Month>().ok()?.number_from_month();
    let day = day.parse::<u32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::parse_from_str(clock, "%H:%M:%S").ok()?;
    Some(date.and_time(time).and_utc())
}

fn severity_from_message(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    if lower.contains("panic") || lower.contains("fatal") {
        severity::CRITICAL
    } else if lower.contains("error") {
        severity::ERROR
    } else if lower.contains("warn") {
        severity::WARN
    } else {
        severity::INFO
    }
}

/// Digits between the first `[` and the first `]` of the tag, trimmed.
fn extract_pid(tag: &str) -> Option<&str> {
    let start = tag.find('[')?;
    let end = tag.find(']')?;
    if end <= start + 1 {
        return None;
    }
    let pid = tag[start + 1..end].trim();
    (!pid.is_empty() && pid.bytes().all(|b| b.is_ascii_digit())).then_some(pid)
}
