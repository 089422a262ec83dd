//! Log parsing -- declared format + raw line -> [`StructuredEvent`].
//!
//! [`LogFormat`] is the closed set of supported grammars. [`LineParser`]
//! owns the compiled grammars and dispatches on the declared format; each
//! variant is a pure function of its input.
//!
//! # Supported formats
//! - `json`: one JSON object per line ([`json`])
//! - `nginx` / `apache`: combined log format ([`access`])
//! - `syslog`: BSD-style `Mon D HH:MM:SS host tag: message` ([`syslog`])
//!
//! # Example
//! ```ignore
//! use tailhub_log_pipeline::parser::LineParser;
//!
//! let parser = LineParser::new()?;
//! let event = parser.parse_or_degrade("nginx", &raw_line);
//! ```

pub mod access;
pub mod json;
pub mod syslog;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Utc};
use regex::Regex;
use tailhub_core::metrics as m;
use tailhub_core::types::{StructuredEvent, severity};

use crate::collector::RawLine;
use crate::error::LogPipelineError;

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogFormat {
    Json,
    Nginx,
    /// Same grammar as [`LogFormat::Nginx`]
    Apache,
    Syslog,
}

impl LogFormat {
    /// Canonical lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Nginx => "nginx",
            Self::Apache => "apache",
            Self::Syslog => "syslog",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = LogPipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "nginx" => Ok(Self::Nginx),
            "apache" => Ok(Self::Apache),
            "syslog" => Ok(Self::Syslog),
            _ => Err(LogPipelineError::UnsupportedFormat(s.to_owned())),
        }
    }
}

/// Compiled grammars plus format dispatch.
///
/// Construct once and share; parsing takes `&self` and holds no state.
#[derive(Debug, Clone)]
pub struct LineParser {
    access: Regex,
    syslog: Regex,
}

impl LineParser {
    /// Compiles the built-in grammars.
    pub fn new() -> Result<Self, LogPipelineError> {
        Ok(Self {
            access: Regex::new(access::PATTERN)?,
            syslog: Regex::new(syslog::PATTERN)?,
        })
    }

    /// Parses `raw` with an already-resolved format.
    pub fn parse(
        &self,
        format: LogFormat,
        raw: &RawLine,
    ) -> Result<StructuredEvent, LogPipelineError> {
        match format {
            LogFormat::Json => json::parse(raw),
            LogFormat::Nginx | LogFormat::Apache => access::parse(&self.access, format, raw),
            LogFormat::Syslog => syslog::parse(&self.syslog, raw, Utc::now().year()),
        }
    }

    /// Parses `raw` with a declared format name.
    ///
    /// Fails with [`LogPipelineError::UnsupportedFormat`] for unknown names
    /// and [`LogPipelineError::Parse`] when the grammar does not match.
    pub fn parse_line(
        &self,
        format: &str,
        raw: &RawLine,
    ) -> Result<StructuredEvent, LogPipelineError> {
        let format = format.parse::<LogFormat>()?;
        self.parse(format, raw)
    }

    /// Like [`parse_line`](Self::parse_line), but never fails.
    ///
    /// Any error is logged at debug level and replaced by
    /// [`StructuredEvent::degraded`].
    pub fn parse_or_degrade(&self, format: &str, raw: &RawLine) -> StructuredEvent {
        match self.parse_line(format, raw) {
            Ok(event) => event,
            Err(e) => {
                metrics::counter!(m::PARSE_ERRORS_TOTAL, m::LABEL_FORMAT => format.to_owned())
                    .increment(1);
                tracing::debug!(
                    source = %raw.source_name,
                    format,
                    error = %e,
                    "parse failed, substituting degraded event"
                );
                StructuredEvent::degraded(
                    raw.source_name.clone(),
                    raw.source_path.clone(),
                    raw.line.clone(),
                    raw.received_at,
                )
            }
        }
    }
}

/// Event skeleton carrying the raw line's identity; parsers fill the rest.
fn base_event(raw: &RawLine, format: &str) -> StructuredEvent {
    StructuredEvent {
        source_name: raw.source_name.clone(),
        source_path: raw.source_path.clone(),
        format: format.to_owned(),
        timestamp: None,
        received_at: raw.received_at,
        severity: severity::UNKNOWN.to_owned(),
        message: String::new(),
        fields: BTreeMap::new(),
        raw: raw.line.clone(),
    }
}

fn no_match(format: &str) -> LogPipelineError {
    LogPipelineError::Parse {
        format: format.to_owned(),
        reason: "line does not match grammar".to_owned(),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::raw;
    use super::*;

    const SEVERITIES: [&str; 6] = ["critical", "error", "warn", "info", "debug", "unknown"];

    #[test]
    fn format_from_str_is_case_insensitive() {
        assert_eq!(" JSON ".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Apache".parse::<LogFormat>().unwrap(), LogFormat::Apache);
        assert_eq!("syslog".parse::<LogFormat>().unwrap(), LogFormat::Syslog);
    }

    #[test]
    fn unknown_format_is_unsupported() {
        let parser = LineParser::new().unwrap();
        let err = parser.parse_line("xml", &raw("<root/>")).unwrap_err();
        assert!(matches!(err, LogPipelineError::UnsupportedFormat(f) if f == "xml"));
    }

    #[test]
    fn degraded_on_grammar_mismatch() {
        let parser = LineParser::new().unwrap();
        let event = parser.parse_or_degrade("nginx", &raw("not an access log"));
        assert_eq!(event.format, "unknown");
        assert_eq!(event.severity, "unknown");
        assert_eq!(event.message, "not an access log");
        assert_eq!(event.raw, "not an access log");
        assert_eq!(event.source_name, "test");
    }

    #[test]
    fn degraded_on_unsupported_format() {
        let parser = LineParser::new().unwrap();
        let event = parser.parse_or_degrade("csv", &raw("a,b,c"));
        assert_eq!(event.format, "unknown");
        assert_eq!(event.message, "a,b,c");
    }

    #[test]
    fn apache_uses_access_grammar_with_declared_name() {
        let parser = LineParser::new().unwrap();
        let line = r#"10.0.0.1 - - [26/Jan/2026:09:00:00 +0000] "GET / HTTP/1.1" 200 12 "-" "curl/8""#;
        let event = parser.parse_line("apache", &raw(line)).unwrap();
        assert_eq!(event.format, "apache");
        assert_eq!(event.message, "GET / 200");
    }

    #[test]
    fn matching_lines_yield_known_severity() {
        let parser = LineParser::new().unwrap();
        let cases = [
            ("json", r#"{"level":"WARNING","msg":"disk"}"#),
            ("json", r#"{"msg":"no level"}"#),
            (
                "nginx",
                r#"1.2.3.4 - - [26/Jan/2026:09:00:00 +0000] "POST /x HTTP/1.1" 404 0 "-" "-""#,
            ),
            ("syslog", "Jan 26 09:00:00 host sshd[42]: Accepted key"),
        ];
        for (format, line) in cases {
            let event = parser.parse_line(format, &raw(line)).unwrap();
            assert!(
                SEVERITIES.contains(&event.severity.as_str()),
                "{format}: unexpected severity {}",
                event.severity
            );
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_or_degrade_never_panics(line in ".{0,300}", format in "json|nginx|apache|syslog|xml") {
                let parser = LineParser::new().unwrap();
                let event = parser.parse_or_degrade(&format, &raw(&line));
                prop_assert!(!event.severity.is_empty());
                prop_assert_eq!(event.raw, line);
            }

            #[test]
            fn parse_is_deterministic(line in ".{0,200}", format in "json|nginx|syslog") {
                let parser = LineParser::new().unwrap();
                let first = parser.parse_or_degrade(&format, &raw(&line));
                let second = parser.parse_or_degrade(&format, &raw(&line));
                prop_assert_eq!(first, second);
            }
        }
    }
}
