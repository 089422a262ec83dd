//! Operator criteria -- an all-optional, AND-combined event predicate.
//!
//! Used as the inline gate in front of the store/hub/stdout path and for
//! one-shot queries.
//!
//! | predicate | passes when                                                   |
//! |-----------|---------------------------------------------------------------|
//! | pattern   | regex matches the raw line OR the message                     |
//! | severity  | equals the event severity, ignoring case                      |
//! | since     | timestamp >= since, or the timestamp is unknown               |
//! | until     | timestamp <= until, or the timestamp is unknown               |
//! | fields    | every `key=value` holds (`source` / `format` are top-level)   |

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use tailhub_core::types::StructuredEvent;

use crate::error::LogPipelineError;

/// Raw operator inputs, as they arrive from CLI flags or a query string.
#[derive(Debug, Clone, Default)]
pub struct CriteriaInputs {
    pub pattern: Option<String>,
    pub severity: Option<String>,
    /// RFC 3339
    pub since: Option<String>,
    /// RFC 3339
    pub until: Option<String>,
    /// `key=value` items
    pub fields: Vec<String>,
}

/// Compiled predicate set. The default value matches everything.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    pub pattern: Option<Regex>,
    /// Lower-cased
    pub severity: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub fields: BTreeMap<String, String>,
}

impl Criteria {
    /// Compiles operator inputs. Blank inputs are treated as absent.
    ///
    /// A bad regex, timestamp or field assignment is a
    /// [`LogPipelineError::Config`] error.
    pub fn from_inputs(inputs: &CriteriaInputs) -> Result<Self, LogPipelineError> {
        let pattern = non_blank(&inputs.pattern)
            .map(|p| {
                Regex::new(p).map_err(|e| LogPipelineError::Config {
                    field: "regex".to_owned(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let severity = non_blank(&inputs.severity).map(|s| s.trim().to_lowercase());
        let since = non_blank(&inputs.since)
            .map(|s| parse_bound("since", s))
            .transpose()?;
        let until = non_blank(&inputs.until)
            .map(|s| parse_bound("until", s))
            .transpose()?;
        let fields = parse_field_assignments(&inputs.fields)?;

        Ok(Self {
            pattern,
            severity,
            since,
            until,
            fields,
        })
    }

    /// True when no predicate is configured.
    pub fn is_empty(&self) -> bool {
        self.pattern.is_none()
            && self.severity.is_none()
            && self.since.is_none()
            && self.until.is_none()
            && self.fields.is_empty()
    }

    /// Whether `event` satisfies every configured predicate.
    pub fn matches(&self, event: &StructuredEvent) -> bool {
        if let Some(re) = &self.pattern
            && !re.is_match(&event.raw)
            && !re.is_match(&event.message)
        {
            return false;
        }

        if let Some(severity) = &self.severity
            && !event.severity.eq_ignore_ascii_case(severity)
        {
            return false;
        }

        // unknown timestamps are never excluded by a time bound
        if let Some(ts) = event.timestamp {
            if self.since.is_some_and(|since| ts < since) {
                return false;
            }
            if self.until.is_some_and(|until| ts > until) {
                return false;
            }
        }

        self.fields
            .iter()
            .all(|(key, value)| field_matches(event, key, value))
    }
}

fn field_matches(event: &StructuredEvent, key: &str, expected: &str) -> bool {
    let actual = match key.to_lowercase().as_str() {
        "source" => Some(event.source_name.as_str()),
        "format" => Some(event.format.as_str()),
        _ => event.fields.get(key).map(String::as_str),
    };
    actual.is_some_and(|actual| actual.eq_ignore_ascii_case(expected))
}

/// Parses `key=value` items; both sides must be non-empty after trimming.
///
/// Later duplicates of a key replace earlier ones.
pub fn parse_field_assignments<S: AsRef<str>>(
    items: &[S],
) -> Result<BTreeMap<String, String>, LogPipelineError> {
    items
        .iter()
        .map(|item| {
            let item = item.as_ref();
            let (key, value) = item.split_once('=').unwrap_or((item, ""));
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                return Err(LogPipelineError::Config {
                    field: "field".to_owned(),
                    reason: format!("field filter must be key=value, got '{item}'"),
                });
            }
            Ok((key.to_owned(), value.to_owned()))
        })
        .collect()
}

fn parse_bound(field: &str, value: &str) -> Result<DateTime<Utc>, LogPipelineError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| LogPipelineError::Config {
            field: field.to_owned(),
            reason: format!("expected RFC 3339 timestamp: {e}"),
        })
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
