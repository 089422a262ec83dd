//! Metric names and descriptions.
//!
//! All Prometheus metric names live here. Stages call `metrics::counter!()`,
//! `metrics::gauge!()` and `metrics::histogram!()` with these constants.
//!
//! # Naming
//!
//! - prefix: `tailhub_`
//! - suffix: `_total` (counter), `_seconds` (histogram), none (gauge)
//!
//! # Example
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(tailhub_core::metrics::LINES_RECEIVED_TOTAL).increment(1);
//! ```

// ─── label keys ────────────────────────────────────────────────────

/// Source name label key
pub const LABEL_SOURCE: &str = "source";

/// Parser format label key (json, nginx, apache, syslog)
pub const LABEL_FORMAT: &str = "format";

/// Alert rule label key
pub const LABEL_RULE: &str = "rule";

// ─── ingest ────────────────────────────────────────────────────────

/// Lines handed over by tailers and backfill (counter, label: source)
pub const LINES_RECEIVED_TOTAL: &str = "tailhub_lines_received_total";

/// Blank lines skipped before parsing (counter)
pub const LINES_SKIPPED_TOTAL: &str = "tailhub_lines_skipped_total";

/// Lines that failed to parse and were degraded (counter, label: format)
pub const PARSE_ERRORS_TOTAL: &str = "tailhub_parse_errors_total";

/// Events that passed the criteria gate (counter)
pub const EVENTS_EMITTED_TOTAL: &str = "tailhub_events_emitted_total";

/// Time to process a single line (histogram, seconds)
pub const PROCESSING_DURATION_SECONDS: &str = "tailhub_processing_duration_seconds";

/// Tailer errors reported on the error channel (counter)
pub const TAILER_ERRORS_TOTAL: &str = "tailhub_tailer_errors_total";

// ─── alerts ────────────────────────────────────────────────────────

/// Alert rule matches (counter, label: rule)
pub const ALERT_MATCHES_TOTAL: &str = "tailhub_alert_matches_total";

/// Matches dropped because the alert channel was full (counter)
pub const ALERTS_DROPPED_TOTAL: &str = "tailhub_alerts_dropped_total";

// ─── store / hub ───────────────────────────────────────────────────

/// Events currently retained by the store (gauge)
pub const STORE_EVENTS: &str = "tailhub_store_events";

/// Live dashboard subscribers (gauge)
pub const HUB_SUBSCRIBERS: &str = "tailhub_hub_subscribers";

/// Payloads dropped by the hub, queue or per-subscriber (counter)
pub const HUB_DROPPED_TOTAL: &str = "tailhub_hub_dropped_total";

// ─── daemon ────────────────────────────────────────────────────────

/// Build information (gauge, always 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "tailhub_daemon_build_info";

// ─── histogram buckets ─────────────────────────────────────────────

/// Per-line processing latency buckets (seconds), 10us to 100ms
pub const PROCESSING_DURATION_BUCKETS: [f64; 8] =
    [0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.1];

/// Registers HELP text for every metric.
///
/// Call once after the global recorder is installed.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        LINES_RECEIVED_TOTAL,
        "Total number of raw lines received from all sources"
    );
    describe_counter!(LINES_SKIPPED_TOTAL, "Total number of blank lines skipped");
    describe_counter!(
        PARSE_ERRORS_TOTAL,
        "Total number of lines that failed to parse and were degraded"
    );
    describe_counter!(
        EVENTS_EMITTED_TOTAL,
        "Total number of events that passed the output criteria"
    );
    describe_histogram!(
        PROCESSING_DURATION_SECONDS,
        "Time to process a single line in seconds"
    );
    describe_counter!(
        TAILER_ERRORS_TOTAL,
        "Total number of errors reported by file tailers"
    );

    describe_counter!(ALERT_MATCHES_TOTAL, "Total number of alert rule matches");
    describe_counter!(
        ALERTS_DROPPED_TOTAL,
        "Total number of alert matches dropped because the alert channel was full"
    );

    describe_gauge!(STORE_EVENTS, "Number of events currently retained");
    describe_gauge!(HUB_SUBSCRIBERS, "Number of live dashboard subscribers");
    describe_counter!(
        HUB_DROPPED_TOTAL,
        "Total number of payloads dropped by the broadcast hub"
    );

    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        LINES_RECEIVED_TOTAL,
        LINES_SKIPPED_TOTAL,
        PARSE_ERRORS_TOTAL,
        EVENTS_EMITTED_TOTAL,
        PROCESSING_DURATION_SECONDS,
        TAILER_ERRORS_TOTAL,
        ALERT_MATCHES_TOTAL,
        ALERTS_DROPPED_TOTAL,
        STORE_EVENTS,
        HUB_SUBSCRIBERS,
        HUB_DROPPED_TOTAL,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_tailhub_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("tailhub_"),
                "Metric '{}' does not start with 'tailhub_' prefix",
                name
            );
        }
    }

    #[test]
    fn counters_end_with_total() {
        for name in [
            LINES_RECEIVED_TOTAL,
            PARSE_ERRORS_TOTAL,
            ALERT_MATCHES_TOTAL,
            HUB_DROPPED_TOTAL,
        ] {
            assert!(name.ends_with("_total"), "{name}");
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        // no recorder installed
        describe_all();
    }

    #[test]
    fn processing_duration_buckets_are_sorted() {
        let buckets = PROCESSING_DURATION_BUCKETS;
        for i in 1..buckets.len() {
            assert!(
                buckets[i] > buckets[i - 1],
                "Bucket values must be in ascending order"
            );
        }
    }
}
