//! Log pipeline error types
//!
//! [`LogPipelineError`] covers every fault raised inside the pipeline.
//! `From<LogPipelineError> for TailhubError` lets the daemon propagate
//! them with `?`.

use tailhub_core::error::{PipelineError, TailhubError};

/// Log pipeline domain error
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// Line does not satisfy the declared grammar
    #[error("parse error: {format}: {reason}")]
    Parse {
        /// Declared format (json, nginx, apache, syslog)
        format: String,
        reason: String,
    },

    /// Declared format is not recognized
    #[error("unsupported log format: {0}")]
    UnsupportedFormat(String),

    /// An alert rule could not be compiled
    #[error("rule compilation error: rule '{rule}': {reason}")]
    RuleCompilation {
        /// Offending rule name (may be empty)
        rule: String,
        reason: String,
    },

    /// Operator-supplied criteria or settings are malformed
    #[error("config error: {field}: {reason}")]
    Config { field: String, reason: String },

    /// The file-system watch could not be created or attached
    #[error("watcher setup error: {path}: {reason}")]
    WatcherSetup { path: String, reason: String },

    /// The active watch reported a fault
    #[error("watch error: {source_name}: {reason}")]
    Watch { source_name: String, reason: String },

    /// Opening the tailed file failed
    #[error("open error: {path}: {reason}")]
    FileOpen { path: String, reason: String },

    /// Reading the tailed file failed
    #[error("read error: {path}: {reason}")]
    Read { path: String, reason: String },

    /// Channel peer went away
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Regex compilation error
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<LogPipelineError> for TailhubError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Channel(reason) => {
                TailhubError::Pipeline(PipelineError::ChannelClosed(reason))
            }
            other => TailhubError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let err = LogPipelineError::Parse {
            format: "nginx".to_owned(),
            reason: "line does not match combined log format".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("nginx"));
        assert!(msg.contains("combined log format"));
    }

    #[test]
    fn rule_compilation_names_rule() {
        let err = LogPipelineError::RuleCompilation {
            rule: "api-500".to_owned(),
            reason: "unclosed group".to_owned(),
        };
        assert!(err.to_string().contains("'api-500'"));
    }

    #[test]
    fn converts_to_tailhub_error() {
        let err = LogPipelineError::UnsupportedFormat("csv".to_owned());
        let top: TailhubError = err.into();
        assert!(matches!(
            top,
            TailhubError::Pipeline(PipelineError::InitFailed(_))
        ));
    }

    #[test]
    fn channel_error_maps_to_channel_closed() {
        let top: TailhubError = LogPipelineError::Channel("raw lines".to_owned()).into();
        assert!(matches!(
            top,
            TailhubError::Pipeline(PipelineError::ChannelClosed(_))
        ));
    }
}
