//! Configuration -- loading and validating the tailhub document.
//!
//! [`TailhubConfig`] is the top-level structure holding every section.
//!
//! # Precedence
//! 1. CLI arguments (highest)
//! 2. Environment variables (`TAILHUB_INGEST_BACKFILL=false` form)
//! 3. Config file (`config/config.json` or a `.toml` file)
//! 4. Defaults (`Default` impls)
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), tailhub_core::error::TailhubError> {
//! use tailhub_core::config::TailhubConfig;
//!
//! // file + env overrides + validation
//! let config = TailhubConfig::load("config/config.json").await?;
//!
//! // straight from a JSON string
//! let config = TailhubConfig::parse_json(r#"{"sources": []}"#)?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, TailhubError};

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";

/// Format names a source may declare.
pub const SUPPORTED_FORMATS: [&str; 4] = ["json", "nginx", "apache", "syslog"];

/// tailhub configuration document.
///
/// Sources and alerts use the plain JSON shape
/// (`sources[{name,path,format}]`, `alerts[{name,pattern,severity,sourceName}]`);
/// every other section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TailhubConfig {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
    /// Tailed sources, in declaration order
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// Alert rules, in declaration order
    #[serde(default)]
    pub alerts: Vec<AlertRuleConfig>,
    /// Ingestion channels and backfill
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Replay store bounds
    #[serde(default)]
    pub store: StoreConfig,
    /// Dashboard HTTP server
    #[serde(default)]
    pub dashboard: DashboardConfig,
    /// Prometheus exporter
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl TailhubConfig {
    /// Loads the file, applies env overrides and validates.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TailhubError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads the file without env overrides or validation.
    ///
    /// JSON unless the extension is `.toml`.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TailhubError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(ConfigError::MissingPath.into());
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TailhubError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                TailhubError::Io(e)
            }
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::parse_toml(&content)
        } else {
            Self::parse_json(&content)
        }
    }

    /// Parses a JSON document.
    pub fn parse_json(json_str: &str) -> Result<Self, TailhubError> {
        serde_json::from_str(json_str).map_err(|e| {
            TailhubError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Parses a TOML document.
    pub fn parse_toml(toml_str: &str) -> Result<Self, TailhubError> {
        toml::from_str(toml_str).map_err(|e| {
            TailhubError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Overrides scalar settings from the environment.
    ///
    /// Naming: `TAILHUB_{SECTION}_{FIELD}`, e.g. `TAILHUB_STORE_MAX_EVENTS=1000`.
    /// Sources and alerts come only from the file.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "TAILHUB_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "TAILHUB_GENERAL_LOG_FORMAT");

        // Ingest
        override_usize(
            &mut self.ingest.channel_capacity,
            "TAILHUB_INGEST_CHANNEL_CAPACITY",
        );
        override_usize(
            &mut self.ingest.error_channel_capacity,
            "TAILHUB_INGEST_ERROR_CHANNEL_CAPACITY",
        );
        override_usize(
            &mut self.ingest.alert_channel_capacity,
            "TAILHUB_INGEST_ALERT_CHANNEL_CAPACITY",
        );
        override_bool(&mut self.ingest.backfill, "TAILHUB_INGEST_BACKFILL");
        override_usize(
            &mut self.ingest.backfill_lines,
            "TAILHUB_INGEST_BACKFILL_LINES",
        );
        override_bool(&mut self.ingest.emit_records, "TAILHUB_INGEST_EMIT_RECORDS");

        // Store
        override_u64(&mut self.store.max_age_secs, "TAILHUB_STORE_MAX_AGE_SECS");
        override_usize(&mut self.store.max_events, "TAILHUB_STORE_MAX_EVENTS");

        // Dashboard
        override_bool(&mut self.dashboard.enabled, "TAILHUB_DASHBOARD_ENABLED");
        override_string(
            &mut self.dashboard.listen_addr,
            "TAILHUB_DASHBOARD_LISTEN_ADDR",
        );
        override_usize(
            &mut self.dashboard.hub_queue_capacity,
            "TAILHUB_DASHBOARD_HUB_QUEUE_CAPACITY",
        );
        override_usize(
            &mut self.dashboard.subscriber_buffer,
            "TAILHUB_DASHBOARD_SUBSCRIBER_BUFFER",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "TAILHUB_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "TAILHUB_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "TAILHUB_METRICS_PORT");
    }

    /// Validates the document. Any failure is fatal at startup.
    pub fn validate(&self) -> Result<(), TailhubError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        let mut seen = HashSet::new();
        for (i, source) in self.sources.iter().enumerate() {
            let name = source.name.trim();
            if name.is_empty() {
                return Err(invalid(
                    format!("sources[{i}].name"),
                    "name is required".to_owned(),
                ));
            }
            if !seen.insert(name.to_owned()) {
                return Err(invalid(
                    format!("sources[{i}].name"),
                    format!("duplicate source name '{name}'"),
                ));
            }
            if source.path.trim().is_empty() {
                return Err(invalid(
                    format!("sources[{i}].path"),
                    format!("path is required for source '{name}'"),
                ));
            }
            let format = source.format.trim().to_lowercase();
            if !SUPPORTED_FORMATS.contains(&format.as_str()) {
                return Err(invalid(
                    format!("sources[{i}].format"),
                    format!(
                        "unsupported format '{}' (expected one of: {})",
                        source.format,
                        SUPPORTED_FORMATS.join(", ")
                    ),
                ));
            }
        }

        for (i, rule) in self.alerts.iter().enumerate() {
            if rule.name.trim().is_empty() {
                return Err(invalid(
                    format!("alerts[{i}].name"),
                    "name is required".to_owned(),
                ));
            }
            if rule.pattern.trim().is_empty() {
                return Err(invalid(
                    format!("alerts[{i}].pattern"),
                    format!("pattern is required for rule '{}'", rule.name),
                ));
            }
        }

        let capacities = [
            ("ingest.channel_capacity", self.ingest.channel_capacity),
            (
                "ingest.error_channel_capacity",
                self.ingest.error_channel_capacity,
            ),
            (
                "ingest.alert_channel_capacity",
                self.ingest.alert_channel_capacity,
            ),
            (
                "dashboard.hub_queue_capacity",
                self.dashboard.hub_queue_capacity,
            ),
            (
                "dashboard.subscriber_buffer",
                self.dashboard.subscriber_buffer,
            ),
        ];
        for (field, value) in capacities {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0".to_owned()));
            }
        }

        Ok(())
    }
}

fn invalid(field: impl Into<String>, reason: String) -> TailhubError {
    ConfigError::InvalidValue {
        field: field.into(),
        reason,
    }
    .into()
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// One tailed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique, non-empty name
    pub name: String,
    /// File path (need not exist yet)
    pub path: String,
    /// json | nginx | apache | syslog
    pub format: String,
}

/// One alert rule declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRuleConfig {
    pub name: String,
    /// Regular expression matched against raw text or message
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(
        default,
        rename = "sourceName",
        alias = "source_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_name: Option<String>,
}

/// Ingestion channel sizes and backfill behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Shared raw-line channel (blocking send)
    pub channel_capacity: usize,
    /// Tailer error channel (drop on full)
    pub error_channel_capacity: usize,
    /// Alert match channel (drop on full)
    pub alert_channel_capacity: usize,
    /// Read each source from the start once before tailing
    pub backfill: bool,
    /// Backfill line cap per source (0 = no limit)
    pub backfill_lines: usize,
    /// Write one JSON record per accepted event to stdout
    pub emit_records: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 128,
            error_channel_capacity: 16,
            alert_channel_capacity: 64,
            backfill: true,
            backfill_lines: 5000,
            emit_records: true,
        }
    }
}

/// Replay store bounds. Zero disables a bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub max_age_secs: u64,
    pub max_events: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 7 * 24 * 60 * 60, // 7 days
            max_events: 50_000,
        }
    }
}

/// Dashboard HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    /// Bind address (`host:port`)
    pub listen_addr: String,
    /// Hub broadcast queue (drop newest on full)
    pub hub_queue_capacity: usize,
    /// Per-subscriber buffer (drop on full)
    pub subscriber_buffer: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:8080".to_owned(),
            hub_queue_capacity: 256,
            subscriber_buffer: 32,
        }
    }
}

/// Prometheus exporter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
        }
    }
}

// --- env override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SAMPLE_JSON: &str = r#"{
        "sources": [
            {"name": "app", "path": "./logs/app.log", "format": "json"},
            {"name": "nginx", "path": "./logs/access.log", "format": "nginx"},
            {"name": "system", "path": "./logs/syslog.log", "format": "syslog"}
        ],
        "alerts": [
            {"name": "panic", "pattern": "panic|fatal", "severity": "critical"},
            {"name": "api-500", "pattern": "500", "sourceName": "nginx"}
        ]
    }"#;

    #[test]
    fn default_config_has_sane_values() {
        let config = TailhubConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "pretty");
        assert!(config.sources.is_empty());
        assert_eq!(config.ingest.channel_capacity, 128);
        assert_eq!(config.ingest.error_channel_capacity, 16);
        assert_eq!(config.ingest.backfill_lines, 5000);
        assert_eq!(config.store.max_age_secs, 604_800);
        assert_eq!(config.store.max_events, 50_000);
        assert_eq!(config.dashboard.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.dashboard.subscriber_buffer, 32);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        TailhubConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_json_sources_and_alerts() {
        let config = TailhubConfig::parse_json(SAMPLE_JSON).unwrap();
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources[1].name, "nginx");
        assert_eq!(config.sources[1].format, "nginx");
        assert_eq!(config.alerts.len(), 2);
        assert_eq!(config.alerts[0].severity.as_deref(), Some("critical"));
        assert!(config.alerts[0].source_name.is_none());
        assert_eq!(config.alerts[1].source_name.as_deref(), Some("nginx"));
        // other sections keep their defaults
        assert_eq!(config.store.max_events, 50_000);
        config.validate().unwrap();
    }

    #[test]
    fn parse_json_accepts_snake_case_source_name() {
        let json = r#"{"alerts":[{"name":"a","pattern":"x","source_name":"db"}]}"#;
        let config = TailhubConfig::parse_json(json).unwrap();
        assert_eq!(config.alerts[0].source_name.as_deref(), Some("db"));
    }

    #[test]
    fn parse_toml_document() {
        let toml = r#"
[general]
log_level = "debug"

[[sources]]
name = "app"
path = "/var/log/app.log"
format = "json"

[[alerts]]
name = "errors"
pattern = "error"
sourceName = "app"

[store]
max_events = 100
"#;
        let config = TailhubConfig::parse_toml(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.sources[0].path, "/var/log/app.log");
        assert_eq!(config.alerts[0].source_name.as_deref(), Some("app"));
        assert_eq!(config.store.max_events, 100);
        assert_eq!(config.store.max_age_secs, 604_800);
    }

    #[test]
    fn parse_json_invalid_returns_error() {
        let err = TailhubConfig::parse_json("{\"sources\": [").unwrap_err();
        assert!(matches!(
            err,
            TailhubError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn parse_json_missing_source_field_returns_error() {
        let err = TailhubConfig::parse_json(r#"{"sources":[{"name":"a"}]}"#).unwrap_err();
        assert!(matches!(
            err,
            TailhubError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = TailhubConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_empty_source_name() {
        let mut config = TailhubConfig::parse_json(SAMPLE_JSON).unwrap();
        config.sources[0].name = "  ".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sources[0].name"));
    }

    #[test]
    fn validate_rejects_duplicate_source_name() {
        let mut config = TailhubConfig::parse_json(SAMPLE_JSON).unwrap();
        config.sources[2].name = "app".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn validate_rejects_empty_source_path() {
        let mut config = TailhubConfig::parse_json(SAMPLE_JSON).unwrap();
        config.sources[1].path = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sources[1].path"));
    }

    #[test]
    fn validate_rejects_unknown_format() {
        let mut config = TailhubConfig::parse_json(SAMPLE_JSON).unwrap();
        config.sources[0].format = "csv".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unsupported format 'csv'"));
    }

    #[test]
    fn validate_accepts_format_case_insensitively() {
        let mut config = TailhubConfig::parse_json(SAMPLE_JSON).unwrap();
        config.sources[0].format = "JSON".to_owned();
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_empty_alert_pattern() {
        let mut config = TailhubConfig::parse_json(SAMPLE_JSON).unwrap();
        config.alerts[1].pattern = " ".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("alerts[1].pattern"));
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut config = TailhubConfig::default();
        config.ingest.channel_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ingest.channel_capacity"));
    }

    #[test]
    fn validate_allows_unlimited_store() {
        let mut config = TailhubConfig::default();
        config.store.max_age_secs = 0;
        config.store.max_events = 0;
        config.validate().unwrap();
    }

    #[test]
    #[serial]
    fn env_overrides_apply_to_sections() {
        let mut config = TailhubConfig::default();
        // SAFETY: #[serial] keeps env mutation single-threaded.
        unsafe {
            std::env::set_var("TAILHUB_STORE_MAX_EVENTS", "10");
            std::env::set_var("TAILHUB_INGEST_BACKFILL", "false");
            std::env::set_var("TAILHUB_DASHBOARD_LISTEN_ADDR", "0.0.0.0:9000");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("TAILHUB_STORE_MAX_EVENTS");
            std::env::remove_var("TAILHUB_INGEST_BACKFILL");
            std::env::remove_var("TAILHUB_DASHBOARD_LISTEN_ADDR");
        }
        assert_eq!(config.store.max_events, 10);
        assert!(!config.ingest.backfill);
        assert_eq!(config.dashboard.listen_addr, "0.0.0.0:9000");
    }

    #[test]
    #[serial]
    fn env_override_invalid_value_keeps_original() {
        let mut val = 7usize;
        // SAFETY: #[serial] keeps env mutation single-threaded.
        unsafe { std::env::set_var("TEST_TAILHUB_USIZE_BAD", "lots") };
        override_usize(&mut val, "TEST_TAILHUB_USIZE_BAD");
        unsafe { std::env::remove_var("TEST_TAILHUB_USIZE_BAD") };
        assert_eq!(val, 7);
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_TAILHUB_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = TailhubConfig::from_file("/nonexistent/path/config.json")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TailhubError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn from_file_empty_path() {
        let err = TailhubConfig::from_file("").await.unwrap_err();
        assert!(matches!(err, TailhubError::Config(ConfigError::MissingPath)));
    }
}
