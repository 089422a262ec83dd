//! File-system event source abstraction.
//!
//! The tailer watches a *directory* and filters events down to its own
//! file, so rotation by delete+recreate stays observable. [`FsEventSource`]
//! hides the backend; [`NotifySource`] is the `notify` implementation and
//! tests can feed synthetic events instead.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::LogPipelineError;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Create,
    Write,
    Remove,
    Rename,
    /// Access, metadata-only and backend-specific events
    Other,
}

/// One file-system notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

impl FsEvent {
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// A live directory watch.
///
/// Dropping it releases the underlying watch handle.
pub struct FsWatch {
    events: mpsc::UnboundedReceiver<Result<FsEvent, String>>,
    _guard: Box<dyn Send>,
}

impl FsWatch {
    /// Wraps an event stream together with whatever keeps it alive.
    pub fn new(
        events: mpsc::UnboundedReceiver<Result<FsEvent, String>>,
        guard: impl Send + 'static,
    ) -> Self {
        Self {
            events,
            _guard: Box::new(guard),
        }
    }

    /// Next event, or `None` once the backend has gone away.
    pub async fn next(&mut self) -> Option<Result<FsEvent, String>> {
        self.events.recv().await
    }
}

/// Something that can watch a directory for create/write/remove/rename.
pub trait FsEventSource {
    /// Starts watching `dir` (non-recursively).
    fn watch(&self, dir: &Path) -> Result<FsWatch, LogPipelineError>;
}

/// [`FsEventSource`] backed by the platform's recommended `notify` watcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifySource;

impl FsEventSource for NotifySource {
    fn watch(&self, dir: &Path) -> Result<FsWatch, LogPipelineError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for fs_event in translate(event) {
                        let _ = tx.send(Ok(fs_event));
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e.to_string()));
                }
            })
            .map_err(|e| setup_error(dir, e))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| setup_error(dir, e))?;

        Ok(FsWatch::new(rx, watcher))
    }
}

fn setup_error(dir: &Path, err: notify::Error) -> LogPipelineError {
    LogPipelineError::WatcherSetup {
        path: dir.display().to_string(),
        reason: err.to_string(),
    }
}

/// Maps a `notify` event onto one [`FsEvent`] per affected path.
///
/// A rename that reports both ends becomes `Rename(from)` + `Create(to)`.
fn translate(event: notify::Event) -> Vec<FsEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => FsEventKind::Create,
        EventKind::Remove(_) => FsEventKind::Remove,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FsEventKind::Create,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            let mut out = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                out.push(FsEvent::new(FsEventKind::Rename, from));
            }
            if let Some(to) = paths.next() {
                out.push(FsEvent::new(FsEventKind::Create, to));
            }
            return out;
        }
        EventKind::Modify(ModifyKind::Name(_)) => FsEventKind::Rename,
        EventKind::Modify(ModifyKind::Metadata(_)) => FsEventKind::Other,
        EventKind::Modify(_) => FsEventKind::Write,
        _ => FsEventKind::Other,
    };

    event
        .paths
        .into_iter()
        .map(|path| FsEvent::new(kind, path))
        .collect()
}
