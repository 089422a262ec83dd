//! JSON log parser
//!
//! Each line is one JSON object. Well-known keys are lifted into the event:
//!
//! | event field | keys (first present wins)   |
//! |-------------|-----------------------------|
//! | timestamp   | `timestamp`, `time`, `ts`   |
//! | message     | `msg`, `message`            |
//! | severity    | `level`, `severity`         |
//!
//! Every other top-level key becomes a field; non-string values keep their
//! JSON text (`123`, `true`, `{"a":1}`).

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tailhub_core::types::{StructuredEvent, normalize_severity};

use super::base_event;
use crate::collector::RawLine;
use crate::error::LogPipelineError;

const FORMAT: &str = "json";

const TIMESTAMP_KEYS: [&str; 3] = ["timestamp", "time", "ts"];
const MESSAGE_KEYS: [&str; 2] = ["msg", "message"];
const SEVERITY_KEYS: [&str; 2] = ["level", "severity"];

pub(crate) fn parse(raw: &RawLine) -> Result<StructuredEvent, LogPipelineError> {
    let value: Value = serde_json::from_str(&raw.line).map_err(|e| LogPipelineError::Parse {
        format: FORMAT.to_owned(),
        reason: e.to_string(),
    })?;

    let Value::Object(object) = value else {
        return Err(LogPipelineError::Parse {
            format: FORMAT.to_owned(),
            reason: "expected JSON object at top level".to_owned(),
        });
    };

    let mut event = base_event(raw, FORMAT);
    event.timestamp = extract_timestamp(&object);
    event.severity = normalize_severity(&first_text(&object, &SEVERITY_KEYS).unwrap_or_default());
    event.message = first_text(&object, &MESSAGE_KEYS)
        .filter(|msg| !msg.is_empty())
        .unwrap_or_else(|| raw.line.clone());

    let reserved = |key: &str| {
        TIMESTAMP_KEYS.contains(&key) || MESSAGE_KEYS.contains(&key) || SEVERITY_KEYS.contains(&key)
    };
    event.fields = object
        .iter()
        .filter(|(key, _)| !reserved(key.as_str()))
        .map(|(key, value)| (key.clone(), value_text(value)))
        .collect();

    Ok(event)
}

/// First timestamp key that holds a usable value.
fn extract_timestamp(object: &Map<String, Value>) -> Option<DateTime<Utc>> {
    TIMESTAMP_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(parse_timestamp)
}

/// RFC 3339 strings (any sub-second precision) or epoch seconds.
///
/// Fractional epoch values are truncated to whole seconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        Value::Number(n) => {
            let secs = match n.as_i64() {
                Some(secs) => secs,
                None => n.as_f64()?.trunc() as i64,
            };
            DateTime::from_timestamp(secs, 0)
        }
        _ => None,
    }
}

fn first_text(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| object.get(*key))
        .map(value_text)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_support::raw;
    use chrono::TimeZone;

    #[test]
    fn parse_reference_line() {
        let line = r#"{"timestamp":"2026-01-26T09:00:00Z","level":"INFO","msg":"startup","user_id":123}"#;
        let event = parse(&raw(line)).unwrap();
        assert_eq!(event.format, "json");
        assert_eq!(event.severity, "info");
        assert_eq!(event.message, "startup");
        assert_eq!(event.fields.get("user_id").map(String::as_str), Some("123"));
        assert_eq!(
            event.timestamp,
            Some(Utc.with_ymd_and_hms(2026, 1, 26, 9, 0, 0).unwrap())
        );
        assert_eq!(event.raw, line);
        // reserved keys are not duplicated into fields
        assert!(!event.fields.contains_key("timestamp"));
        assert!(!event.fields.contains_key("level"));
        assert!(!event.fields.contains_key("msg"));
    }

    #[test]
    fn parse_fractional_rfc3339() {
        let event = parse(&raw(r#"{"time":"2026-01-26T09:00:00.123456789+02:00"}"#)).unwrap();
        let ts = event.timestamp.unwrap();
        assert_eq!(ts.timestamp(), 1_769_410_800);
        assert_eq!(ts.timestamp_subsec_nanos(), 123_456_789);
    }

    #[test]
    fn parse_epoch_seconds() {
        let event = parse(&raw(r#"{"ts":1769418000}"#)).unwrap();
        assert_eq!(event.timestamp.unwrap().timestamp(), 1_769_418_000);

        let event = parse(&raw(r#"{"ts":1769418000.75}"#)).unwrap();
        assert_eq!(event.timestamp.unwrap().timestamp(), 1_769_418_000);
    }

    #[test]
    fn timestamp_key_order_skips_unusable_values() {
        let event = parse(&raw(r#"{"timestamp":"yesterday","ts":0}"#)).unwrap();
        assert_eq!(event.timestamp.unwrap().timestamp(), 0);
    }

    #[test]
    fn missing_timestamp_is_unknown() {
        let event = parse(&raw(r#"{"msg":"hi"}"#)).unwrap();
        assert!(event.timestamp.is_none());
    }

    #[test]
    fn message_falls_back_to_raw() {
        let line = r#"{"level":"error","code":7}"#;
        let event = parse(&raw(line)).unwrap();
        assert_eq!(event.message, line);
        assert_eq!(event.severity, "error");
    }

    #[test]
    fn message_key_preferred_order() {
        let event = parse(&raw(r#"{"message":"second","msg":"first"}"#)).unwrap();
        assert_eq!(event.message, "first");
    }

    #[test]
    fn severity_alias_and_default() {
        let event = parse(&raw(r#"{"severity":"Warning"}"#)).unwrap();
        assert_eq!(event.severity, "warn");

        let event = parse(&raw(r#"{"msg":"x"}"#)).unwrap();
        assert_eq!(event.severity, "unknown");

        let event = parse(&raw(r#"{"level":"NOTICE"}"#)).unwrap();
        assert_eq!(event.severity, "notice");
    }

    #[test]
    fn non_string_fields_are_stringified() {
        let event = parse(&raw(r#"{"ok":true,"ratio":0.5,"tags":["a"],"meta":{"k":1}}"#)).unwrap();
        assert_eq!(event.fields["ok"], "true");
        assert_eq!(event.fields["ratio"], "0.5");
        assert_eq!(event.fields["tags"], r#"["a"]"#);
        assert_eq!(event.fields["meta"], r#"{"k":1}"#);
    }

    #[test]
    fn invalid_json_fails() {
        let err = parse(&raw("{not json")).unwrap_err();
        assert!(matches!(err, LogPipelineError::Parse { format, .. } if format == "json"));
    }

    #[test]
    fn non_object_fails() {
        assert!(parse(&raw("[1,2,3]")).is_err());
        assert!(parse(&raw("42")).is_err());
    }
}
