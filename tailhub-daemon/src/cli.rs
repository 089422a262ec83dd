//! CLI argument definitions for tailhub-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use tailhub_core::config::{DEFAULT_CONFIG_PATH, TailhubConfig};
use tailhub_log_pipeline::CriteriaInputs;

/// tailhub log aggregation daemon.
///
/// Tails the configured sources, prints one JSON record per matching event,
/// logs alert matches, and serves a live dashboard.
#[derive(Parser, Debug)]
#[command(name = "tailhub-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to the JSON (or `.toml`) configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Only emit events whose raw line or message matches this regex.
    #[arg(long)]
    pub regex: Option<String>,

    /// Only emit events with this severity (critical, error, warn, info, debug, unknown).
    #[arg(long)]
    pub severity: Option<String>,

    /// Only emit events at or after this RFC 3339 timestamp.
    #[arg(long)]
    pub since: Option<String>,

    /// Only emit events at or before this RFC 3339 timestamp.
    #[arg(long)]
    pub until: Option<String>,

    /// Field filter `key=value`; repeatable. `source` and `format` match the event itself.
    #[arg(long = "field", value_name = "KEY=VALUE")]
    pub fields: Vec<String>,

    /// Dashboard listen address. An empty string disables the dashboard.
    #[arg(long)]
    pub http_addr: Option<String>,

    /// Skip reading existing file content before tailing.
    #[arg(long)]
    pub no_backfill: bool,

    /// Backfill line cap per source (0 = no limit).
    #[arg(long)]
    pub backfill_lines: Option<usize>,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Criteria inputs gathered from the filter flags.
    pub fn criteria_inputs(&self) -> CriteriaInputs {
        CriteriaInputs {
            pattern: self.regex.clone(),
            severity: self.severity.clone(),
            since: self.since.clone(),
            until: self.until.clone(),
            fields: self.fields.clone(),
        }
    }

    /// Loads the config file, layers env and flag overrides, then validates.
    ///
    /// Validation runs last so a flag can repair a bad value from the file.
    pub async fn load_config(&self) -> Result<TailhubConfig> {
        let mut config = TailhubConfig::from_file(&self.config).await.map_err(|e| {
            anyhow::anyhow!("failed to load config {}: {}", self.config.display(), e)
        })?;
        config.apply_env_overrides();
        self.apply_overrides(&mut config);
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        Ok(config)
    }

    /// Applies flag overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut TailhubConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(addr) = &self.http_addr {
            let addr = addr.trim();
            config.dashboard.enabled = !addr.is_empty();
            if !addr.is_empty() {
                config.dashboard.listen_addr = addr.to_owned();
            }
        }
        if self.no_backfill {
            config.ingest.backfill = false;
        }
        if let Some(lines) = self.backfill_lines {
            config.ingest.backfill_lines = lines;
        }
    }
}
