//! Encoder invocation: argument construction and spawning.
//!
//! Three invocation shapes are supported: a single still frame written to a
//! file, a continuous recording written to a file, and a continuous recording
//! written to stdout with a small real-time encoding profile.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::ChildStdout;
use tracing::{debug, error, info};

use super::process::EncoderProcess;
use crate::config::EncoderConfig;
use crate::{Error, Result};

/// Platform family, which decides how a capture device is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// DirectShow; devices are referenced by name.
    Windows,
    /// Video4Linux2; devices are referenced by `/dev/<name>`.
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }

    /// `-f <subsystem> -i <device>` for this platform.
    pub fn input_args(self, device: &str) -> [String; 4] {
        match self {
            Self::Windows => [
                "-f".to_string(),
                "dshow".to_string(),
                "-i".to_string(),
                format!("video={}", device.trim()),
            ],
            Self::Unix => [
                "-f".to_string(),
                "v4l2".to_string(),
                "-i".to_string(),
                format!("/dev/{device}"),
            ],
        }
    }
}

/// Severity used when forwarding encoder stderr to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StderrLevel {
    Error,
    Debug,
}

/// Convert a duration given in tenths of a second to the `-t` value.
///
/// Returns `None` for absent, zero, negative or non-finite durations.
pub fn duration_arg(tenths: Option<f64>) -> Option<String> {
    tenths
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| (d / 10.0).to_string())
}

/// Builds and spawns encoder processes.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    config: EncoderConfig,
    platform: Platform,
}

impl ProcessLauncher {
    pub fn new(config: EncoderConfig) -> Self {
        Self::with_platform(config, Platform::current())
    }

    pub fn with_platform(config: EncoderConfig, platform: Platform) -> Self {
        Self { config, platform }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    fn base_args(&self, device: &str) -> Vec<String> {
        let mut args = self.config.input_args.clone();
        args.extend(self.platform.input_args(device));
        args
    }

    /// Arguments for a single still frame.
    pub fn capture_args(&self, device: &str, dest: &Path) -> Vec<String> {
        let mut args = self.base_args(device);
        args.extend(
            [
                "-frames:v",
                "1",
                "-update",
                "1",
                "-pix_fmt",
                "yuvj422p",
                "-loglevel",
                "error",
                "-y",
            ]
            .map(String::from),
        );
        args.push(dest.to_string_lossy().to_string());
        args
    }

    /// Arguments for a continuous recording to `dest`.
    pub fn record_args(&self, device: &str, dest: &Path, duration: Option<f64>) -> Vec<String> {
        let mut args = self.base_args(device);
        if let Some(secs) = duration_arg(duration) {
            args.extend(["-t".to_string(), secs]);
        }
        args.extend(["-movflags", "faststart", "-y"].map(String::from));
        args.push(dest.to_string_lossy().to_string());
        args
    }

    /// Arguments for a continuous MPEG-TS stream on stdout.
    pub fn stream_args(&self, device: &str, duration: Option<f64>) -> Vec<String> {
        let mut args = self.base_args(device);
        if let Some(secs) = duration_arg(duration) {
            args.extend(["-t".to_string(), secs]);
        }
        args.extend([
            "-f".to_string(),
            "mpegts".to_string(),
            "-codec:v".to_string(),
            "mpeg1video".to_string(),
            "-b:v".to_string(),
            self.config.video_bitrate.clone(),
            "-r".to_string(),
            self.config.video_fps.to_string(),
            "-s".to_string(),
            self.config.video_resolution.clone(),
            "-".to_string(),
        ]);
        args
    }

    /// Arguments that make the encoder print the attached capture devices.
    pub fn probe_args(&self) -> Vec<String> {
        let mut args = self.config.input_args.clone();
        let probe: &[&str] = match self.platform {
            Platform::Windows => &[
                "-hide_banner",
                "-list_devices",
                "true",
                "-f",
                "dshow",
                "-i",
                "dummy",
            ],
            Platform::Unix => &["-f", "v4l2", "-list_formats", "all", "-i", "/dev/video0"],
        };
        args.extend(probe.iter().map(|s| s.to_string()));
        args
    }

    fn command(&self, args: &[String]) -> tokio::process::Command {
        let mut cmd = process_utils::encoder_command(&self.config.binary_path);
        cmd.args(args);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> Error {
        Error::spawn_failure(format!(
            "failed to spawn {}: {}",
            self.config.binary_path, e
        ))
    }

    /// Capture one still frame into `dest` and wait for the encoder to exit.
    ///
    /// Succeeds only if the encoder exits with status zero and `dest` exists.
    pub async fn capture(&self, device: &str, dest: &Path) -> Result<()> {
        let args = self.capture_args(device, dest);
        info!("{} args is: {:?}", self.config.binary_path, args);

        let mut child = self
            .command(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(stderr) = child.stderr.take() {
            forward_stderr(stderr, "capture".to_string(), StderrLevel::Error);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::spawn_failure(format!("error waiting for encoder: {e}")))?;

        let exists = tokio::fs::try_exists(dest).await.unwrap_or(false);
        match status.code() {
            Some(0) if exists => Ok(()),
            Some(0) => Err(Error::spawn_failure(format!(
                "encoder exited with code 0 but {} was not created",
                dest.display()
            ))),
            Some(code) => Err(Error::spawn_failure(format!("ffmpeg exit code {code}"))),
            None => Err(Error::spawn_failure("ffmpeg terminated by signal")),
        }
    }

    /// Start a continuous recording into `dest`. Returns as soon as the encoder runs.
    pub fn record_to_file(
        &self,
        device: &str,
        dest: &Path,
        duration: Option<f64>,
        label: &str,
    ) -> Result<EncoderProcess> {
        let args = self.record_args(device, dest, duration);
        info!("{} args is: {:?}", self.config.binary_path, args);

        let mut child = self
            .command(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(stderr) = child.stderr.take() {
            forward_stderr(stderr, label.to_string(), StderrLevel::Debug);
        }

        Ok(EncoderProcess::supervise(child, label))
    }

    /// Start a continuous stream on the encoder's stdout.
    pub fn record_to_pipe(
        &self,
        device: &str,
        duration: Option<f64>,
        label: &str,
    ) -> Result<(EncoderProcess, ChildStdout)> {
        let args = self.stream_args(device, duration);
        info!("{} args is: {:?}", self.config.binary_path, args);

        let mut child = self
            .command(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::spawn_failure("failed to capture encoder stdout"))?;

        if let Some(stderr) = child.stderr.take() {
            forward_stderr(stderr, label.to_string(), StderrLevel::Debug);
        }

        Ok((EncoderProcess::supervise(child, label), stdout))
    }

    /// Run the device listing invocation and return everything it printed on stderr.
    pub async fn probe_devices(&self) -> Result<String> {
        let args = self.probe_args();
        debug!("{} args is: {:?}", self.config.binary_path, args);

        let output = self
            .command(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        Ok(String::from_utf8_lossy(&output.stderr).into_owned())
    }
}

fn forward_stderr<R>(stderr: R, label: String, level: StderrLevel)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match level {
                    StderrLevel::Error => error!(process = %label, "[ffmpeg] {}", line),
                    StderrLevel::Debug => debug!(process = %label, "[ffmpeg] {}", line),
                },
                Ok(None) => break,
                Err(e) => {
                    debug!(process = %label, error = %e, "Stopped reading encoder stderr");
                    break;
                }
            }
        }
    });
}
