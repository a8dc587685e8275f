//! Integration tests for the camera lifecycle.
//!
//! ffmpeg is replaced by `sh -c <script>`: the generated encoder arguments
//! become the script's positional parameters, so each script decides how the
//! fake encoder behaves (create the output, wait for `q`, stream bytes...).

#![cfg(unix)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mcp_camera::Error;
use mcp_camera::camera::{
    CameraManager, DeviceRegistry, Platform, ProcessLauncher, RecordingStarted, RecordingStopped,
};
use mcp_camera::config::{EncoderConfig, SessionConfig};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

/// Writes an empty file at the last argument, like a successful still capture.
const CAPTURE_OK: &str = r#"for last; do :; done; : > "$last""#;
/// Runs until it reads one byte (`q`) from stdin.
const WAIT_FOR_QUIT: &str = "exec head -c 1 >/dev/null";
/// Emits a few bytes then idles until stopped.
const STREAM: &str = "printf chunk; exec sleep 5";

fn manager(script: &str, sessions: SessionConfig) -> CameraManager {
    let encoder = EncoderConfig {
        binary_path: "sh".to_string(),
        input_args: vec!["-c".into(), script.into(), "ffmpeg".into()],
        ..EncoderConfig::default()
    };
    CameraManager::with_registry(
        DeviceRegistry::from_devices(vec!["video0".into(), "video1".into()]),
        ProcessLauncher::with_platform(encoder, Platform::Unix),
        sessions,
    )
}

fn quick_sessions() -> SessionConfig {
    SessionConfig {
        cleanup_grace: Duration::from_secs(60),
        reservation_expiry: Duration::from_secs(60),
        stop_timeout: Duration::from_secs(2),
    }
}

async fn eventually<F: Fn() -> bool>(what: &str, cond: F) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

mod photo_tests {
    use super::*;

    #[tokio::test]
    async fn test_photo_success_requires_file() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("shot.jpg");

        let photo = manager(CAPTURE_OK, quick_sessions())
            .take_photo(1, &dest)
            .await
            .unwrap();
        assert_eq!(photo.image_path, dest);
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn test_photo_clean_exit_without_file_fails() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("never.jpg");

        let err = manager("exit 0", quick_sessions())
            .take_photo(1, &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SpawnFailure { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_photo_nonzero_exit_reports_code() {
        let temp = TempDir::new().unwrap();
        let err = manager("exit 3", quick_sessions())
            .take_photo(2, &temp.path().join("x.jpg"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ffmpeg exit code 3"), "{err}");
    }

    #[tokio::test]
    async fn test_photo_invalid_handle() {
        let temp = TempDir::new().unwrap();
        let err = manager(CAPTURE_OK, quick_sessions())
            .take_photo(3, &temp.path().join("x.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHandle { handle: 3 }));
        assert!(!temp.path().join("x.jpg").exists());
    }
}

mod recording_tests {
    use super::*;

    async fn start_file(manager: &CameraManager, dir: &TempDir) -> (String, PathBuf) {
        let dest = dir.path().join("clip.mp4");
        match manager
            .start_recording(1, Some(dest.clone()), None)
            .await
            .unwrap()
        {
            RecordingStarted::ToFile {
                video_id,
                video_path,
            } => {
                assert_eq!(video_path, dest);
                (video_id, video_path)
            }
            other => panic!("expected a file recording, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_and_stop_file_recording() {
        let temp = TempDir::new().unwrap();
        let manager = manager(WAIT_FOR_QUIT, quick_sessions());
        let (id, path) = start_file(&manager, &temp).await;
        assert_eq!(manager.session_counts().recordings, 1);

        let stopped = manager.stop_recording(&id).await.unwrap();
        assert_eq!(stopped, RecordingStopped::Recording { video_path: path });
        assert_eq!(manager.session_counts().recordings, 0);

        let again = manager.stop_recording(&id).await.unwrap_err();
        assert!(again.is_not_found());
    }

    #[tokio::test]
    async fn test_duration_is_passed_in_seconds_and_stop_waits_for_exit() {
        let temp = TempDir::new().unwrap();
        let args_file = temp.path().join("args.txt");
        let script = format!(
            r#"printf '%s\n' "$@" > '{}'; exec head -c 1 >/dev/null"#,
            args_file.display()
        );
        let manager = manager(&script, quick_sessions());
        let out_dir = temp.path().join("x");

        let started = manager
            .start_recording(1, Some(out_dir.join("clip.mp4")), Some(50.0))
            .await
            .unwrap();
        let id = started.video_id().to_string();
        eventually("the encoder to record its arguments", || args_file.exists()).await;
        let session = manager.store().recordings().get(&id).unwrap();

        let stopped = manager.stop_recording(&id).await.unwrap();
        assert!(session.process().has_exited());
        assert!(stopped.video_path().unwrap().starts_with(&out_dir));

        let args = std::fs::read_to_string(&args_file).unwrap();
        let args: Vec<&str> = args.lines().collect();
        let t = args.iter().position(|a| *a == "-t").unwrap();
        assert_eq!(args[t + 1], "5");
        assert!(args.contains(&"/dev/video0"));
    }

    #[tokio::test]
    async fn test_concurrent_stops_succeed_once() {
        let temp = TempDir::new().unwrap();
        let manager = Arc::new(manager(WAIT_FOR_QUIT, quick_sessions()));
        let (id, _) = start_file(&manager, &temp).await;

        let attempts: Vec<_> = (0..4)
            .map(|_| {
                let manager = manager.clone();
                let id = id.clone();
                tokio::spawn(async move { manager.stop_recording(&id).await })
            })
            .collect();

        let mut successes = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert!(e.is_not_found(), "{e}"),
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_stubborn_encoder_is_killed_after_timeout() {
        let temp = TempDir::new().unwrap();
        let sessions = SessionConfig {
            stop_timeout: Duration::from_millis(200),
            ..quick_sessions()
        };
        let manager = manager("exec sleep 30", sessions);
        let (id, _) = start_file(&manager, &temp).await;
        let session = manager.store().recordings().get(&id).unwrap();

        let stopped = tokio::time::timeout(Duration::from_secs(5), manager.stop_recording(&id))
            .await
            .expect("stop must not hang on an encoder that ignores q")
            .unwrap();
        assert!(matches!(stopped, RecordingStopped::Recording { .. }));
        assert!(session.process().has_exited());
    }

    #[tokio::test]
    async fn test_finished_recording_is_purged_after_grace() {
        let temp = TempDir::new().unwrap();
        let sessions = SessionConfig {
            cleanup_grace: Duration::from_millis(100),
            ..quick_sessions()
        };
        let manager = manager("sleep 0.2", sessions);
        let (id, _) = start_file(&manager, &temp).await;

        eventually("the finished recording to be purged", || {
            !manager.store().recordings().contains(&id)
        })
        .await;
        assert!(manager.stop_recording(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_finished_recording_can_be_stopped_within_grace() {
        let temp = TempDir::new().unwrap();
        let manager = manager("exit 0", quick_sessions());
        let (id, path) = start_file(&manager, &temp).await;

        let session = manager.store().recordings().get(&id).unwrap();
        eventually("the exit observer to run", || session.is_stopped()).await;

        let stopped = manager.stop_recording(&id).await.unwrap();
        assert_eq!(stopped.video_path(), Some(&path));
        assert!(!manager.store().recordings().contains(&id));
    }

    #[tokio::test]
    async fn test_invalid_handle_spawns_nothing() {
        let temp = TempDir::new().unwrap();
        let manager = manager(WAIT_FOR_QUIT, quick_sessions());
        let err = manager
            .start_recording(0, Some(temp.path().join("x.mp4")), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHandle { handle: 0 }));
        assert_eq!(manager.session_counts().recordings, 0);
    }
}

mod stream_tests {
    use super::*;

    async fn reserve(manager: &CameraManager) -> String {
        match manager.start_recording(2, None, Some(50.0)).await.unwrap() {
            RecordingStarted::Reserved {
                video_id,
                stream_url,
            } => {
                assert!(stream_url.ends_with(&video_id));
                video_id
            }
            other => panic!("expected a reservation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reservation_spawns_nothing_until_connect() {
        let manager = manager(STREAM, quick_sessions());
        let id = reserve(&manager).await;
        assert_eq!(manager.session_counts().reservations, 1);
        assert_eq!(manager.session_counts().recordings, 0);

        let mut handle = manager.connect_stream(&id).await.unwrap();
        assert_eq!(handle.session_id, id);

        let mut buf = [0u8; 5];
        handle.output.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"chunk");
        assert_eq!(manager.session_counts().recordings, 1);

        let stopped = manager.stop_recording(&id).await.unwrap();
        assert_eq!(stopped, RecordingStopped::Stream);
        assert_eq!(manager.session_counts().reservations, 0);
        assert_eq!(manager.session_counts().recordings, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_connects_succeed_once() {
        let manager = Arc::new(manager(STREAM, quick_sessions()));
        let id = reserve(&manager).await;

        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                let id = id.clone();
                tokio::spawn(async move { manager.connect_stream(&id).await })
            })
            .collect();

        let mut handles = Vec::new();
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(handle) => handles.push(handle),
                Err(e) => assert!(e.is_not_found(), "{e}"),
            }
        }
        assert_eq!(handles.len(), 1);
        assert_eq!(manager.session_counts().recordings, 1);

        manager.stop_recording(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_reservation_expires() {
        let sessions = SessionConfig {
            reservation_expiry: Duration::from_millis(100),
            ..quick_sessions()
        };
        let manager = manager(STREAM, sessions);
        let id = reserve(&manager).await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(manager.connect_stream(&id).await.unwrap_err().is_not_found());
        assert!(manager.stop_recording(&id).await.unwrap_err().is_not_found());
        assert_eq!(manager.session_counts().recordings, 0);
    }

    #[tokio::test]
    async fn test_stopping_reservation_prevents_connect() {
        let manager = manager(STREAM, quick_sessions());
        let id = reserve(&manager).await;

        let stopped = manager.stop_recording(&id).await.unwrap();
        assert_eq!(stopped, RecordingStopped::Reservation);
        assert_eq!(stopped.message(), "Stream stopped");
        assert!(manager.connect_stream(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_stream_exit_clears_consumed_reservation() {
        let manager = manager("printf done", quick_sessions());
        let id = reserve(&manager).await;

        let mut handle = manager.connect_stream(&id).await.unwrap();
        let mut out = String::new();
        handle.output.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "done");

        eventually("the consumed reservation to be cleared", || {
            !manager.store().reservations().contains(&id)
        })
        .await;
        // The finished stream stays in the recording table until its grace ends.
        assert!(manager.store().recordings().contains(&id));
        assert!(manager.store().recordings().is_armed(&id));
    }

    #[tokio::test]
    async fn test_reservation_for_unknown_camera_is_rejected() {
        let manager = manager(STREAM, quick_sessions());
        let err = manager.start_recording(5, None, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidHandle { handle: 5 }));
        assert_eq!(manager.session_counts().reservations, 0);
    }
}

mod server_tests {
    use super::*;
    use mcp_camera::api::{ApiServer, ApiServerConfig, AppState};
    use mcp_camera::config::{ArtifactConfig, ServerInfo};
    use mcp_camera::mcp::{CameraTools, McpHandler};
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_util::sync::CancellationToken;

    const ENDLESS_STREAM: &str = "printf chunk; exec sleep 30";

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_with_live_stream_stops_server() {
        let manager = Arc::new(manager(ENDLESS_STREAM, quick_sessions()));
        let url = match manager.start_recording(1, None, None).await.unwrap() {
            RecordingStarted::Reserved { stream_url, .. } => stream_url,
            other => panic!("expected a reservation, got {other:?}"),
        };

        let tools = CameraTools::new(manager.clone(), ArtifactConfig::default());
        let handler = Arc::new(McpHandler::new(tools, ServerInfo::default()));
        let cancel = CancellationToken::new();
        let server = ApiServer::with_cancel_token(
            ApiServerConfig::default(),
            AppState::new(manager.clone(), handler),
            cancel.clone(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let serving = tokio::spawn(async move { server.serve(listener).await });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(format!("GET {url} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
            .await
            .unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 512];
        while !String::from_utf8_lossy(&received).contains("chunk") {
            let n = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert!(n > 0, "connection closed before the stream started");
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(manager.session_counts().recordings, 1);

        cancel.cancel();
        let finished = tokio::time::timeout(Duration::from_secs(5), serving).await;
        assert!(finished.is_ok(), "server kept draining a live stream after cancel");
        finished.unwrap().unwrap().unwrap();

        let session = manager.store().recordings().values().pop().unwrap();
        assert!(session.process().has_exited());
    }
}
