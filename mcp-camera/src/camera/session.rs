//! Recording sessions: an encoder process bound to a session id.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use super::process::{EncoderProcess, ExitSignal};

/// What a session's encoder writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Continuous recording into a file.
    File,
    /// Continuous stream to a connected client.
    Stream,
}

/// One active or just-finished encoder tied to a session id.
#[derive(Debug)]
pub struct RecordingSession {
    id: String,
    camera: i64,
    kind: SessionKind,
    path: Option<PathBuf>,
    process: EncoderProcess,
    stopped: AtomicBool,
    started_at: DateTime<Utc>,
}

impl RecordingSession {
    pub fn file(id: impl Into<String>, camera: i64, path: PathBuf, process: EncoderProcess) -> Self {
        Self::new(id.into(), camera, SessionKind::File, Some(path), process)
    }

    pub fn stream(id: impl Into<String>, camera: i64, process: EncoderProcess) -> Self {
        Self::new(id.into(), camera, SessionKind::Stream, None, process)
    }

    fn new(
        id: String,
        camera: i64,
        kind: SessionKind,
        path: Option<PathBuf>,
        process: EncoderProcess,
    ) -> Self {
        Self {
            id,
            camera,
            kind,
            path,
            process,
            stopped: AtomicBool::new(false),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn camera(&self) -> i64 {
        self.camera
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn process(&self) -> &EncoderProcess {
        &self.process
    }

    pub fn exit_signal(&self) -> ExitSignal {
        self.process.exit_signal()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Set by the exit observer once the encoder has exited.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Whether the encoder is still running.
    pub fn is_running(&self) -> bool {
        !self.is_stopped() && !self.process.has_exited()
    }
}
