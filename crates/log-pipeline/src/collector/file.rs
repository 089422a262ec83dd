//! Rotation-aware file tailer
//!
//! Follows one source file the way `tail -F` does, driven by directory
//! notifications instead of polling.
//!
//! # Behaviour
//! - startup: open the file at end-of-file if it exists; absence is not an error
//! - write: read everything from the current position, emit complete lines in
//!   order, keep the unterminated tail for the next read
//! - remove / rename: close the descriptor and wait for a create
//! - create (no descriptor held): reopen from the beginning and drain
//! - replacement (a new file renamed over the path, unix only): finish the
//!   old descriptor, then reopen the new file from the beginning
//! - truncation (length below read position): rewind to 0 and drop the tail
//!
//! Emission blocks on the shared channel until space frees up or the
//! cancellation token fires. Errors go to the error channel with `try_send`.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tailhub_core::config::SourceConfig;

use super::watch::{FsEventKind, FsEventSource, FsWatch};
use super::{RawLine, notify_error};
use crate::error::LogPipelineError;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Splits a byte stream into complete lines.
///
/// Bytes after the last `\n` are retained and prepended to the next line;
/// a fragment is never emitted on its own.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the lines it completed, terminators stripped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            while self.pending.last() == Some(&b'\r') {
                self.pending.pop();
            }
            lines.push(String::from_utf8_lossy(&self.pending).into_owned());
            self.pending.clear();
            rest = &rest[pos + 1..];
        }

        self.pending.extend_from_slice(rest);
        lines
    }

    /// The retained unterminated fragment.
    pub fn partial(&self) -> String {
        String::from_utf8_lossy(&self.pending).into_owned()
    }

    /// Discards the retained fragment.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Tails one configured source.
#[derive(Debug, Clone)]
pub struct FileTailer {
    source_name: String,
    target: PathBuf,
}

impl FileTailer {
    /// Resolves the source path to an absolute path under a canonical parent.
    ///
    /// The file itself may be missing; its parent directory must exist.
    pub fn new(source: &SourceConfig) -> Result<Self, LogPipelineError> {
        Ok(Self {
            source_name: source.name.clone(),
            target: resolve_target(Path::new(&source.path))?,
        })
    }

    /// Source name this tailer reports.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Resolved file path the tailer follows.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Starts the watch and spawns the tail task.
    ///
    /// Returns as soon as the directory watch is attached. Fails only when
    /// the watch cannot be created.
    pub fn start<S>(
        self,
        fs: &S,
        out: mpsc::Sender<RawLine>,
        errs: mpsc::Sender<LogPipelineError>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, LogPipelineError>
    where
        S: FsEventSource + ?Sized,
    {
        let dir = self
            .target
            .parent()
            .ok_or_else(|| LogPipelineError::WatcherSetup {
                path: self.target.display().to_string(),
                reason: "path has no parent directory".to_owned(),
            })?;
        let watch = fs.watch(dir)?;

        info!(
            source = %self.source_name,
            path = %self.target.display(),
            "tailer started"
        );

        let task = TailTask {
            source_name: self.source_name,
            source_path: self.target.display().to_string(),
            target: self.target,
            out,
            errs,
            cancel,
            file: None,
            file_id: None,
            position: 0,
            assembler: LineAssembler::new(),
        };
        Ok(tokio::spawn(task.run(watch)))
    }
}

pub(crate) fn resolve_target(path: &Path) -> Result<PathBuf, LogPipelineError> {
    let setup = |reason: String| LogPipelineError::WatcherSetup {
        path: path.display().to_string(),
        reason,
    };

    let absolute = std::path::absolute(path).map_err(|e| setup(e.to_string()))?;
    let file_name = absolute
        .file_name()
        .ok_or_else(|| setup("path has no file name".to_owned()))?
        .to_owned();
    let parent = absolute
        .parent()
        .ok_or_else(|| setup("path has no parent directory".to_owned()))?;
    let parent = std::fs::canonicalize(parent)
        .map_err(|e| setup(format!("cannot resolve parent directory: {e}")))?;

    Ok(parent.join(file_name))
}

/// Path equality, case-insensitive on case-insensitive filesystems.
fn same_file(a: &Path, b: &Path) -> bool {
    if cfg!(any(windows, target_os = "macos")) {
        a.to_string_lossy()
            .eq_ignore_ascii_case(&b.to_string_lossy())
    } else {
        a == b
    }
}

/// Device and inode of an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileId {
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
fn file_id(meta: &std::fs::Metadata) -> Option<FileId> {
    use std::os::unix::fs::MetadataExt;

    Some(FileId {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

#[cfg(not(unix))]
fn file_id(_meta: &std::fs::Metadata) -> Option<FileId> {
    None
}

/// Whether the loop should keep going.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct TailTask {
    source_name: String,
    source_path: String,
    target: PathBuf,
    out: mpsc::Sender<RawLine>,
    errs: mpsc::Sender<LogPipelineError>,
    cancel: CancellationToken,
    file: Option<File>,
    file_id: Option<FileId>,
    position: u64,
    assembler: LineAssembler,
}

impl TailTask {
    async fn run(mut self, mut watch: FsWatch) {
        match self.open(true).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(source = %self.source_name, "file absent, waiting for create");
            }
            Err(e) => self.report_open(e),
        }

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                next = watch.next() => {
                    let event = match next {
                        Some(Ok(event)) => event,
                        Some(Err(reason)) => {
                            notify_error(&self.errs, LogPipelineError::Watch {
                                source_name: self.source_name.clone(),
                                reason,
                            });
                            continue;
                        }
                        None => {
                            warn!(source = %self.source_name, "watch stream ended");
                            break;
                        }
                    };

                    if !same_file(&event.path, &self.target) {
                        continue;
                    }
                    if self.handle(event.kind).await == Flow::Stop {
                        break;
                    }
                }
            }
        }

        self.close();
        info!(source = %self.source_name, "tailer stopped");
    }

    async fn handle(&mut self, kind: FsEventKind) -> Flow {
        match kind {
            FsEventKind::Remove | FsEventKind::Rename => {
                debug!(source = %self.source_name, ?kind, "file moved away, closing");
                self.close();
                Flow::Continue
            }
            FsEventKind::Create => {
                if self.file.is_some() {
                    return self.follow_replacement().await;
                }
                self.reopen_and_drain().await
            }
            FsEventKind::Write => {
                if self.file.is_some() {
                    if self.follow_replacement().await == Flow::Stop {
                        return Flow::Stop;
                    }
                } else {
                    match self.open(false).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => return Flow::Continue,
                        Err(e) => {
                            self.report_open(e);
                            return Flow::Continue;
                        }
                    }
                }
                self.drain().await
            }
            FsEventKind::Other => Flow::Continue,
        }
    }

    async fn reopen_and_drain(&mut self) -> Flow {
        match self.open(false).await {
            Ok(()) => self.drain().await,
            Err(e) if e.kind() == ErrorKind::NotFound => Flow::Continue,
            Err(e) => {
                self.report_open(e);
                Flow::Continue
            }
        }
    }

    /// Switches to a new file moved over the target path.
    ///
    /// The held descriptor is read to its end first; lines still buffered in
    /// the old file are not lost.
    async fn follow_replacement(&mut self) -> Flow {
        if !self.replaced().await {
            return Flow::Continue;
        }
        if self.drain().await == Flow::Stop {
            return Flow::Stop;
        }
        info!(source = %self.source_name, "file replaced, reopening from start");
        self.reopen_and_drain().await
    }

    /// Whether the target path now names a different file than the one held.
    async fn replaced(&self) -> bool {
        let Some(held) = self.file_id else {
            return false;
        };
        match tokio::fs::metadata(&self.target).await {
            Ok(meta) => file_id(&meta).is_some_and(|current| current != held),
            Err(_) => false,
        }
    }

    /// Opens the target at the start or the end; resets the line state.
    async fn open(&mut self, at_end: bool) -> std::io::Result<()> {
        self.close();

        let mut file = File::open(&self.target).await?;
        let id = file_id(&file.metadata().await?);
        let from = if at_end {
            SeekFrom::End(0)
        } else {
            SeekFrom::Start(0)
        };
        self.position = file.seek(from).await?;
        self.file = Some(file);
        self.file_id = id;
        self.assembler.clear();
        Ok(())
    }

    fn close(&mut self) {
        self.file = None;
        self.file_id = None;
        self.position = 0;
    }

    /// Reads all available content and emits the completed lines.
    async fn drain(&mut self) -> Flow {
        match self.read_available().await {
            Ok(flow) => flow,
            Err(e) => {
                notify_error(
                    &self.errs,
                    LogPipelineError::Read {
                        path: self.source_path.clone(),
                        reason: e.to_string(),
                    },
                );
                Flow::Continue
            }
        }
    }

    async fn read_available(&mut self) -> std::io::Result<Flow> {
        let Some(file) = self.file.as_mut() else {
            return Ok(Flow::Continue);
        };

        let len = file.metadata().await?.len();
        if len < self.position {
            info!(
                source = %self.source_name,
                len,
                position = self.position,
                "file truncated, rewinding"
            );
            self.position = file.seek(SeekFrom::Start(0)).await?;
            self.assembler.clear();
        }

        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                return Ok(Flow::Continue);
            }
            self.position += n as u64;

            for line in self.assembler.push(&buf[..n]) {
                let raw = RawLine {
                    source_name: self.source_name.clone(),
                    source_path: self.source_path.clone(),
                    line,
                    received_at: Utc::now(),
                };
                if emit(&self.out, &self.cancel, raw).await == Flow::Stop {
                    return Ok(Flow::Stop);
                }
            }
        }
    }

    fn report_open(&self, err: std::io::Error) {
        notify_error(
            &self.errs,
            LogPipelineError::FileOpen {
                path: self.source_path.clone(),
                reason: err.to_string(),
            },
        );
    }
}

/// Blocking send, abandoned on cancellation or when the consumer is gone.
async fn emit(out: &mpsc::Sender<RawLine>, cancel: &CancellationToken, raw: RawLine) -> Flow {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Flow::Stop,
        sent = out.send(raw) => match sent {
            Ok(()) => Flow::Continue,
            Err(_) => {
                debug!("line channel closed, stopping tailer");
                Flow::Stop
            }
        },
    }
}
