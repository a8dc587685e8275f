//! Camera lifecycle manager.
//!
//! Orchestrates still captures, file recordings and reserved streams on top
//! of the device registry, the process launcher and the session store.
//!
//! Session states:
//!
//! ```text
//! reservation:  PENDING ──connect──▶ RUNNING ──exit──▶ STOPPED ──grace──▶ (purged)
//!                  │                    │                  │
//!                  └─expiry / stop──▶ (gone)   stop ──▶ (removed) ◀── stop
//! file record:              RUNNING ──exit──▶ STOPPED ──grace──▶ (purged)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::launcher::ProcessLauncher;
use super::registry::{self, DeviceRegistry};
use super::session::{RecordingSession, SessionKind};
use super::store::SessionStore;
use super::types::{
    CameraInfo, PhotoTaken, RecordingStarted, RecordingStopped, StreamHandle, StreamReservation,
    stream_url,
};
use crate::config::{AppConfig, SessionConfig};
use crate::{Error, Result};

/// Number of live entries in each session table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCounts {
    pub recordings: usize,
    pub reservations: usize,
}

/// The lifecycle controller behind every camera tool.
pub struct CameraManager {
    registry: DeviceRegistry,
    launcher: ProcessLauncher,
    store: SessionStore,
    sessions: SessionConfig,
}

impl CameraManager {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(ProcessLauncher::new(config.encoder.clone()), config.sessions)
    }

    pub fn new(launcher: ProcessLauncher, sessions: SessionConfig) -> Self {
        Self::with_registry(DeviceRegistry::new(), launcher, sessions)
    }

    /// Create a manager over an already populated registry.
    pub fn with_registry(
        registry: DeviceRegistry,
        launcher: ProcessLauncher,
        sessions: SessionConfig,
    ) -> Self {
        Self {
            registry,
            launcher,
            store: SessionStore::new(),
            sessions,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn session_counts(&self) -> SessionCounts {
        SessionCounts {
            recordings: self.store.recordings().len(),
            reservations: self.store.reservations().len(),
        }
    }

    /// Probe the OS for cameras and replace the registry contents.
    pub async fn initialize_devices(&self) -> usize {
        let devices = registry::probe_devices(&self.launcher).await;
        let count = devices.len();
        self.registry.replace(devices);
        count
    }

    pub fn list_cameras(&self) -> Vec<CameraInfo> {
        self.registry.list()
    }

    pub fn resolve(&self, handle: i64) -> Result<String> {
        self.registry
            .resolve(handle)
            .ok_or_else(|| Error::invalid_handle(handle))
    }

    /// Capture one still frame from `handle` into `dest`.
    pub async fn take_photo(&self, handle: i64, dest: &Path) -> Result<PhotoTaken> {
        let device = self.resolve(handle)?;
        match self.launcher.capture(&device, dest).await {
            Ok(()) => {
                info!(camera = handle, path = %dest.display(), "Photo captured");
                Ok(PhotoTaken {
                    image_path: dest.to_path_buf(),
                })
            }
            Err(e) => {
                warn!(camera = handle, error = %e, "Photo capture failed");
                Err(e)
            }
        }
    }

    /// Start a file recording, or reserve a stream when `dest` is absent.
    ///
    /// `duration` is in tenths of a second.
    pub async fn start_recording(
        &self,
        handle: i64,
        dest: Option<PathBuf>,
        duration: Option<f64>,
    ) -> Result<RecordingStarted> {
        let video_id = Uuid::new_v4().to_string();

        let Some(dest) = dest else {
            self.resolve(handle)?;
            let reservation = StreamReservation::new(video_id.clone(), handle, duration);
            self.store.reservations().insert(
                video_id.clone(),
                reservation,
                Some(self.sessions.reservation_expiry),
            );
            info!(video_id = %video_id, camera = handle, "Stream reserved, waiting for client");
            return Ok(RecordingStarted::Reserved {
                stream_url: stream_url(&video_id),
                video_id,
            });
        };

        let device = self.resolve(handle)?;
        let process = self
            .launcher
            .record_to_file(&device, &dest, duration, &video_id)
            .inspect_err(|e| warn!(camera = handle, error = %e, "Failed to start recording"))?;

        let session = Arc::new(RecordingSession::file(
            video_id.clone(),
            handle,
            dest.clone(),
            process,
        ));
        self.register(session);

        info!(
            video_id = %video_id,
            device = %device,
            path = %dest.display(),
            duration = ?duration,
            "Recording started"
        );
        Ok(RecordingStarted::ToFile {
            video_id,
            video_path: dest,
        })
    }

    /// Connect to a stream reservation. Succeeds at most once per reservation.
    pub async fn connect_stream(&self, id: &str) -> Result<StreamHandle> {
        let reservation = self.store.consume_once(id)?;

        let spawned = self.resolve(reservation.camera).and_then(|device| {
            self.launcher
                .record_to_pipe(&device, reservation.duration, id)
        });
        let (process, output) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!(video_id = %id, error = %e, "Failed to start stream");
                self.store.reservations().remove(id);
                return Err(e);
            }
        };

        let session = Arc::new(RecordingSession::stream(id, reservation.camera, process));
        self.register(session);

        // The consumed residue is cleared by the exit observer or, failing
        // that, by this timer, which replaces the reservation's own expiry.
        self.store
            .reservations()
            .arm(id, self.sessions.reservation_expiry);

        let waited_ms = (Utc::now() - reservation.created_at).num_milliseconds();
        info!(video_id = %id, camera = reservation.camera, waited_ms, "Stream connected");
        Ok(StreamHandle {
            session_id: reservation.id,
            output,
        })
    }

    /// Stop a reservation, a stream or a recording by id.
    pub async fn stop_recording(&self, id: &str) -> Result<RecordingStopped> {
        if self
            .store
            .reservations()
            .remove_if(id, |r| !r.consumed)
            .is_some()
        {
            info!(video_id = %id, "Stream reservation stopped");
            return Ok(RecordingStopped::Reservation);
        }

        let Some(session) = self.store.recordings().get(id) else {
            return Err(Error::not_found(id));
        };

        if session.is_running() {
            self.terminate(&session).await;
        }

        // Only the first remover reports success.
        if self
            .store
            .recordings()
            .remove_if(id, |s| Arc::ptr_eq(s, &session))
            .is_none()
        {
            return Err(Error::not_found(id));
        }

        match (session.kind(), session.path()) {
            (SessionKind::File, Some(path)) => {
                info!(
                    video_id = %id,
                    camera = session.camera(),
                    started_at = %session.started_at(),
                    "Recording stopped"
                );
                Ok(RecordingStopped::Recording {
                    video_path: path.to_path_buf(),
                })
            }
            _ => {
                self.store.reservations().remove(id);
                info!(
                    video_id = %id,
                    camera = session.camera(),
                    started_at = %session.started_at(),
                    "Stream stopped"
                );
                Ok(RecordingStopped::Stream)
            }
        }
    }

    /// Stop every running encoder. Used on shutdown.
    pub async fn shutdown(&self) {
        let running: Vec<_> = self
            .store
            .recordings()
            .values()
            .into_iter()
            .filter(|s| s.is_running())
            .collect();

        if !running.is_empty() {
            info!(count = running.len(), "Stopping running encoders");
        }
        futures::future::join_all(running.iter().map(|s| self.terminate(s))).await;
    }

    /// Graceful stop, escalating to a kill after the stop timeout.
    async fn terminate(&self, session: &RecordingSession) {
        let process = session.process();
        let method = process.request_stop().await;
        info!(video_id = %session.id(), pid = ?process.pid(), %method, "Stop requested");

        let exit = process.exit_signal();
        let outcome = match tokio::time::timeout(self.sessions.stop_timeout, exit.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    video_id = %session.id(),
                    pid = ?process.pid(),
                    timeout = ?self.sessions.stop_timeout,
                    "Encoder did not stop in time, killing"
                );
                process.kill();
                exit.wait().await
            }
        };
        info!(video_id = %session.id(), %outcome, "Encoder process exited");
    }

    /// Insert a session and attach its exit observer.
    fn register(&self, session: Arc<RecordingSession>) {
        let id = session.id().to_string();
        self.store.recordings().insert(id.clone(), session.clone(), None);

        let recordings = self.store.recordings().clone();
        let reservations = self.store.reservations().clone();
        let grace = self.sessions.cleanup_grace;

        tokio::spawn(async move {
            let outcome = session.exit_signal().wait().await;
            session.mark_stopped();
            info!(
                video_id = %id,
                camera = session.camera(),
                %outcome,
                "Recording process exited"
            );

            if session.kind() == SessionKind::Stream {
                reservations.remove(&id);
            }
            recordings.arm_if(&id, grace, |s| Arc::ptr_eq(s, &session));
        });
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::camera::launcher::Platform;
    use crate::config::EncoderConfig;
    use std::time::Duration;

    fn manager_with_script(script: &str, sessions: SessionConfig) -> CameraManager {
        let encoder = EncoderConfig {
            binary_path: "sh".to_string(),
            input_args: vec!["-c".into(), script.into(), "ffmpeg".into()],
            ..EncoderConfig::default()
        };
        CameraManager::with_registry(
            DeviceRegistry::from_devices(vec!["video0".into()]),
            ProcessLauncher::with_platform(encoder, Platform::Unix),
            sessions,
        )
    }

    #[tokio::test]
    async fn test_invalid_handle_fails_without_spawning() {
        // A missing binary would surface as SpawnFailure if anything were spawned.
        let encoder = EncoderConfig {
            binary_path: "/nonexistent/ffmpeg".to_string(),
            ..EncoderConfig::default()
        };
        let manager = CameraManager::with_registry(
            DeviceRegistry::from_devices(vec!["video0".into()]),
            ProcessLauncher::with_platform(encoder, Platform::Unix),
            SessionConfig::default(),
        );

        let err = manager
            .take_photo(7, Path::new("/tmp/x.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHandle { handle: 7 }));

        let err = manager.start_recording(0, None, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidHandle { handle: 0 }));
        assert_eq!(manager.session_counts().reservations, 0);
    }

    #[tokio::test]
    async fn test_exit_observer_marks_session_stopped_and_arms_cleanup() {
        let manager = manager_with_script("exit 0", SessionConfig::default());
        let started = manager
            .start_recording(1, Some(PathBuf::from("/tmp/unused.mp4")), None)
            .await
            .unwrap();
        let id = started.video_id().to_string();

        let session = manager.store().recordings().get(&id).unwrap();
        session.exit_signal().wait().await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while !manager.store().recordings().is_armed(&id) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(session.is_stopped());
    }

    #[tokio::test]
    async fn test_shutdown_stops_running_encoders() {
        let sessions = SessionConfig {
            stop_timeout: Duration::from_millis(200),
            ..SessionConfig::default()
        };
        let manager = manager_with_script("exec sleep 30", sessions);
        let started = manager
            .start_recording(1, Some(PathBuf::from("/tmp/unused.mp4")), None)
            .await
            .unwrap();
        let session = manager
            .store()
            .recordings()
            .get(started.video_id())
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), manager.shutdown())
            .await
            .unwrap();
        assert!(session.process().has_exited());
    }
}
