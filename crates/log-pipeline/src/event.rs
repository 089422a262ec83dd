//! Display representation shared by the store, the hub and stdout.
//!
//! [`DisplayEvent`] is the wire shape of one accepted event. The live
//! stream and the stdout record carry `received_at`; replay responses use
//! [`ReplayEvent`], which is the same object without it.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tailhub_core::types::StructuredEvent;

/// One event as shown to dashboards and written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayEvent {
    /// Parsed timestamp, omitted when unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub severity: String,
    pub message: String,
    pub source: String,
    pub format: String,
    pub fields: BTreeMap<String, String>,
    pub raw: String,
}

impl DisplayEvent {
    /// Parsed timestamp when known, otherwise arrival time.
    ///
    /// Retention and replay bounds compare against this.
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or(self.received_at)
    }

    /// JSON payload for the live stream and stdout.
    pub fn to_payload(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Borrowed view used by replay responses.
    pub fn replay_view(&self) -> ReplayEvent<'_> {
        ReplayEvent {
            timestamp: self.timestamp,
            severity: &self.severity,
            message: &self.message,
            source: &self.source,
            format: &self.format,
            fields: &self.fields,
            raw: &self.raw,
        }
    }
}

impl From<&StructuredEvent> for DisplayEvent {
    fn from(event: &StructuredEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            received_at: event.received_at,
            severity: event.severity.clone(),
            message: event.message.clone(),
            source: event.source_name.clone(),
            format: event.format.clone(),
            fields: event.fields.clone(),
            raw: event.raw.clone(),
        }
    }
}

/// Replay item: [`DisplayEvent`] without `received_at`.
#[derive(Debug, Serialize)]
pub struct ReplayEvent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub severity: &'a str,
    pub message: &'a str,
    pub source: &'a str,
    pub format: &'a str,
    pub fields: &'a BTreeMap<String, String>,
    pub raw: &'a str,
}
