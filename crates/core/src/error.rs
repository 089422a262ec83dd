//! Error types shared across crates.

/// tailhub top-level error.
#[derive(Debug, thiserror::Error)]
pub enum TailhubError {
    /// Configuration fault (always fatal at startup)
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline fault
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O fault
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config path was empty
    #[error("config path is required")]
    MissingPath,

    /// Config file does not exist
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// Document could not be decoded
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A value failed validation
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Pipeline errors surfaced to the daemon.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A component could not be constructed
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// A channel peer went away
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}
