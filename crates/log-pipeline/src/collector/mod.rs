//! Log collection -- turns appended file content into [`RawLine`]s.
//!
//! # Pieces
//! - [`FileTailer`]: rotation-aware tail of one configured source
//! - [`backfill`]: one-shot, capped read of a source from the beginning
//! - [`watch`]: file-system event abstraction the tailer is driven by
//!
//! # Architecture
//! Every tailer runs in its own tokio task and sends complete lines over a
//! shared bounded `tokio::mpsc::Sender<RawLine>`. The send blocks when the
//! pipeline falls behind and is abandoned on cancellation. Faults go to a
//! separate error channel with `try_send`.

pub mod backfill;
pub mod file;
pub mod watch;

pub use backfill::backfill;
pub use file::{FileTailer, LineAssembler};
pub use watch::{FsEvent, FsEventKind, FsEventSource, FsWatch, NotifySource};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::LogPipelineError;

/// One complete, terminator-free line read from a source.
///
/// Produced once per line boundary and consumed once by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Configured source name
    pub source_name: String,
    /// Path the line was read from
    pub source_path: String,
    /// Line content without `\n` / `\r\n`
    pub line: String,
    /// When the line was read
    pub received_at: DateTime<Utc>,
}

impl RawLine {
    /// Creates a line stamped with the current time.
    pub fn new(
        source_name: impl Into<String>,
        source_path: impl Into<String>,
        line: impl Into<String>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            source_path: source_path.into(),
            line: line.into(),
            received_at: Utc::now(),
        }
    }

    /// Whether the line has no visible content.
    pub fn is_blank(&self) -> bool {
        self.line.trim().is_empty()
    }
}

/// Pushes a collector fault without ever blocking; drops it if the channel is full.
pub(crate) fn notify_error(errs: &mpsc::Sender<LogPipelineError>, err: LogPipelineError) {
    if let Err(e) = errs.try_send(err) {
        tracing::debug!(error = %e, "error channel unavailable, dropping collector error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_line_creation() {
        let raw = RawLine::new("app", "/var/log/app.log", "hello");
        assert_eq!(raw.source_name, "app");
        assert_eq!(raw.source_path, "/var/log/app.log");
        assert_eq!(raw.line, "hello");
        assert!(!raw.is_blank());
    }

    #[test]
    fn whitespace_line_is_blank() {
        assert!(RawLine::new("a", "b", "").is_blank());
        assert!(RawLine::new("a", "b", " \t ").is_blank());
    }

    #[tokio::test]
    async fn notify_error_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        notify_error(&tx, LogPipelineError::Channel("first".to_owned()));
        notify_error(&tx, LogPipelineError::Channel("second".to_owned()));

        let first = rx.recv().await.unwrap();
        assert!(first.to_string().contains("first"));
        assert!(rx.try_recv().is_err());
    }
}
