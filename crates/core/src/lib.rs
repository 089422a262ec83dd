//! tailhub core -- shared types, configuration, errors and metric names.
//!
//! Every other tailhub crate depends on this one. It owns no runtime state:
//! the data model ([`StructuredEvent`]), the severity vocabulary, the
//! configuration document ([`TailhubConfig`]) and the top-level error enums.

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- re-exports ---

pub use config::{
    AlertRuleConfig, DashboardConfig, GeneralConfig, IngestConfig, MetricsConfig, SourceConfig,
    StoreConfig, TailhubConfig,
};
pub use error::{ConfigError, PipelineError, TailhubError};
pub use types::{StructuredEvent, normalize_severity};
