//! Domain types shared by every pipeline stage.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized severity vocabulary.
pub mod severity {
    pub const CRITICAL: &str = "critical";
    pub const ERROR: &str = "error";
    pub const WARN: &str = "warn";
    pub const INFO: &str = "info";
    pub const DEBUG: &str = "debug";
    /// Floor value; a severity is never empty.
    pub const UNKNOWN: &str = "unknown";
}

/// Format label given to events that failed to parse.
pub const FORMAT_UNKNOWN: &str = "unknown";

/// Normalizes a free-form level string.
///
/// Known aliases collapse onto the vocabulary in [`severity`]; an empty
/// string becomes `unknown`; anything else passes through lower-cased.
pub fn normalize_severity(value: &str) -> String {
    let value = value.trim().to_lowercase();
    let normalized = match value.as_str() {
        "" => severity::UNKNOWN,
        "panic" | "fatal" | "critical" | "crit" => severity::CRITICAL,
        "err" | "error" => severity::ERROR,
        "warn" | "warning" => severity::WARN,
        "info" | "information" => severity::INFO,
        "debug" | "trace" => severity::DEBUG,
        _ => return value,
    };
    normalized.to_owned()
}

/// One log line after normalization.
///
/// Produced once by the parser and then shared read-only by the filter,
/// the alert evaluator, the store and the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredEvent {
    /// Configured source name
    pub source_name: String,
    /// Resolved path of the source file
    pub source_path: String,
    /// Format label (`json`, `nginx`, `apache`, `syslog` or `unknown`)
    pub format: String,
    /// Timestamp carried by the record. `None` means "unknown", not a failure.
    pub timestamp: Option<DateTime<Utc>>,
    /// When the tailer saw the line
    pub received_at: DateTime<Utc>,
    /// Normalized severity, never empty
    pub severity: String,
    /// Normalized message
    pub message: String,
    /// Format-specific fields
    pub fields: BTreeMap<String, String>,
    /// The line exactly as read
    pub raw: String,
}

impl StructuredEvent {
    /// Builds the degraded event substituted when a line cannot be parsed.
    ///
    /// Every downstream stage still receives a well-formed event.
    pub fn degraded(
        source_name: impl Into<String>,
        source_path: impl Into<String>,
        raw: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let raw = raw.into();
        Self {
            source_name: source_name.into(),
            source_path: source_path.into(),
            format: FORMAT_UNKNOWN.to_owned(),
            timestamp: None,
            received_at,
            severity: severity::UNKNOWN.to_owned(),
            message: raw.clone(),
            fields: BTreeMap::new(),
            raw,
        }
    }

    /// Parsed timestamp when known, otherwise the receive time.
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or(self.received_at)
    }
}

impl fmt::Display for StructuredEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.severity, self.source_name, self.format, self.message,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_known_aliases() {
        assert_eq!(normalize_severity("PANIC"), "critical");
        assert_eq!(normalize_severity("crit"), "critical");
        assert_eq!(normalize_severity(" Err "), "error");
        assert_eq!(normalize_severity("WARNING"), "warn");
        assert_eq!(normalize_severity("information"), "info");
        assert_eq!(normalize_severity("trace"), "debug");
    }

    #[test]
    fn normalize_empty_is_unknown() {
        assert_eq!(normalize_severity(""), "unknown");
        assert_eq!(normalize_severity("   "), "unknown");
    }

    #[test]
    fn normalize_passes_through_lowercased() {
        assert_eq!(normalize_severity("NOTICE"), "notice");
        assert_eq!(normalize_severity("Emerg"), "emerg");
    }

    #[test]
    fn degraded_event_keeps_raw_line() {
        let now = Utc::now();
        let event = StructuredEvent::degraded("app", "/var/log/app.log", "garbage{", now);
        assert_eq!(event.format, "unknown");
        assert_eq!(event.severity, "unknown");
        assert_eq!(event.message, "garbage{");
        assert_eq!(event.raw, "garbage{");
        assert!(event.timestamp.is_none());
        assert!(event.fields.is_empty());
        assert_eq!(event.effective_time(), now);
    }
}
