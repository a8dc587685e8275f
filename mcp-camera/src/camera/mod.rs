//! Camera devices, encoder processes and recording sessions.

pub mod launcher;
pub mod manager;
pub mod process;
pub mod registry;
pub mod session;
pub mod store;
pub mod types;

pub use launcher::{Platform, ProcessLauncher};
pub use manager::{CameraManager, SessionCounts};
pub use process::{EncoderProcess, ExitOutcome, ExitSignal, StopMethod};
pub use registry::DeviceRegistry;
pub use session::{RecordingSession, SessionKind};
pub use store::{SessionStore, TableKind, TimedTable};
pub use types::{
    CameraInfo, PhotoTaken, RecordingStarted, RecordingStopped, STREAM_ROUTE, StreamHandle,
    StreamReservation, stream_url,
};
