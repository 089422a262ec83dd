//! One-shot backfill of existing file content.
//!
//! Runs before live tailing starts and feeds the same line channel, so
//! history and live lines take the same processing path. Independent of
//! [`FileTailer`](super::FileTailer), which always starts at end-of-file.

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tailhub_core::config::SourceConfig;

use super::RawLine;
use super::file::resolve_target;
use crate::error::LogPipelineError;

/// Reads `source` from the beginning and sends up to `limit` lines.
///
/// `limit == 0` means no cap. A trailing unterminated line is included.
/// Lines carry the same resolved path the tailer reports.
/// Returns the number of lines sent; stops early on cancellation.
pub async fn backfill(
    source: &SourceConfig,
    limit: usize,
    out: &mpsc::Sender<RawLine>,
    cancel: &CancellationToken,
) -> Result<usize, LogPipelineError> {
    let path = resolve_target(Path::new(&source.path))
        .map(|target| target.display().to_string())
        .unwrap_or_else(|_| source.path.clone());
    let file = File::open(&path)
        .await
        .map_err(|e| LogPipelineError::FileOpen {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut count = 0usize;

    loop {
        if limit > 0 && count >= limit {
            break;
        }

        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| LogPipelineError::Read {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if n == 0 {
            break;
        }

        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        let raw = RawLine::new(
            source.name.clone(),
            path.clone(),
            String::from_utf8_lossy(&buf).into_owned(),
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = out.send(raw) => {
                if sent.is_err() {
                    return Err(LogPipelineError::Channel("line channel closed during backfill".to_owned()));
                }
            }
        }
        count += 1;
    }

    tracing::debug!(source = %source.name, lines = count, "backfill complete");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(path: &std::path::Path) -> SourceConfig {
        SourceConfig {
            name: "app".to_owned(),
            path: path.display().to_string(),
            format: "json".to_owned(),
        }
    }

    #[tokio::test]
    async fn backfill_reads_from_start_with_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "one\r\ntwo\nthree\nfour\n").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let count = backfill(&source(&path), 3, &tx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(count, 3);

        let lines: Vec<String> = (0..3).map(|_| rx.try_recv().unwrap().line).collect();
        assert_eq!(lines, vec!["one", "two", "three"]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn backfill_zero_limit_reads_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "a\nb\nunterminated").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let count = backfill(&source(&path), 0, &tx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(count, 3);
        rx.try_recv().unwrap();
        rx.try_recv().unwrap();
        assert_eq!(rx.try_recv().unwrap().line, "unterminated");
    }

    #[tokio::test]
    async fn backfill_missing_file_is_open_error() {
        let (tx, _rx) = mpsc::channel(1);
        let cfg = SourceConfig {
            name: "missing".to_owned(),
            path: "/no/such/file.log".to_owned(),
            format: "syslog".to_owned(),
        };
        let err = backfill(&cfg, 10, &tx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LogPipelineError::FileOpen { .. }));
    }

    #[tokio::test]
    async fn backfill_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "1\n2\n3\n").unwrap();

        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let count = backfill(&source(&path), 0, &tx, &cancel).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn backfill_reports_tailer_path() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("app.log"), "one\n").unwrap();
        let indirect = dir.path().join("logs/../logs/app.log");

        let (tx, mut rx) = mpsc::channel(4);
        backfill(&source(&indirect), 0, &tx, &CancellationToken::new())
            .await
            .unwrap();

        let tailer = crate::collector::FileTailer::new(&source(&indirect)).unwrap();
        let line = rx.try_recv().unwrap();
        assert_eq!(line.source_path, tailer.target().display().to_string());
        assert!(!line.source_path.contains(".."));
    }
}
