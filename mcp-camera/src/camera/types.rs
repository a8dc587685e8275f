//! Camera domain types and per-operation results.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::ChildStdout;

/// Route under which reserved streams are served.
pub const STREAM_ROUTE: &str = "/video/stream";

/// A camera as exposed to callers: a 1-based handle plus its device name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraInfo {
    #[serde(rename = "cameraID")]
    pub camera_id: usize,
    pub name: String,
    pub description: String,
}

/// Successful still capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoTaken {
    pub image_path: PathBuf,
}

/// Successful `start_recording`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingStarted {
    /// An encoder is running and writing to `video_path`.
    ToFile { video_id: String, video_path: PathBuf },
    /// A stream was reserved; nothing runs until a client connects to `stream_url`.
    Reserved { video_id: String, stream_url: String },
}

impl RecordingStarted {
    pub fn video_id(&self) -> &str {
        match self {
            Self::ToFile { video_id, .. } | Self::Reserved { video_id, .. } => video_id,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::ToFile { .. } => "Video recording started",
            Self::Reserved { .. } => "Stream prepared, waiting for client connection",
        }
    }
}

/// What a successful `stop_recording` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingStopped {
    /// An unconnected stream reservation was withdrawn.
    Reservation,
    /// A connected stream encoder was stopped.
    Stream,
    /// A file recording was stopped; the file is at `video_path`.
    Recording { video_path: PathBuf },
}

impl RecordingStopped {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Reservation | Self::Stream => "Stream stopped",
            Self::Recording { .. } => "Video recording stopped",
        }
    }

    pub fn video_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Recording { video_path } => Some(video_path),
            _ => None,
        }
    }
}

/// Build the retrieval reference handed out for a stream reservation.
pub fn stream_url(video_id: &str) -> String {
    format!("{STREAM_ROUTE}?videoID={video_id}")
}

/// The live output of a connected stream.
#[derive(Debug)]
pub struct StreamHandle {
    pub session_id: String,
    pub output: ChildStdout,
}

/// A deferred piped-stream request.
#[derive(Debug, Clone)]
pub struct StreamReservation {
    pub id: String,
    pub camera: i64,
    /// Requested duration in tenths of a second.
    pub duration: Option<f64>,
    pub consumed: bool,
    pub created_at: DateTime<Utc>,
}

impl StreamReservation {
    pub fn new(id: impl Into<String>, camera: i64, duration: Option<f64>) -> Self {
        Self {
            id: id.into(),
            camera,
            duration,
            consumed: false,
            created_at: Utc::now(),
        }
    }
}
