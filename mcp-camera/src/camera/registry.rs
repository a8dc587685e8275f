//! Capture device registry.
//!
//! The device list is probed once at start-up and handed out as 1-based
//! handles. Re-probing replaces the list wholesale; entries are never edited
//! in place, so a resolved name stays stable until the next probe.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use regex::Regex;
use tracing::{info, warn};

use super::launcher::{Platform, ProcessLauncher};
use super::types::CameraInfo;

static DSHOW_DEVICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)" \(video\)"#).expect("valid regex"));

static V4L2_DEVICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[video4linux2,v4l2\] (/dev/video\d+)").expect("valid regex"));

/// Extract device names from the encoder's device listing output.
pub fn parse_device_list(platform: Platform, output: &str) -> Vec<String> {
    match platform {
        Platform::Windows => DSHOW_DEVICE
            .captures_iter(output)
            .map(|c| c[1].to_string())
            .collect(),
        Platform::Unix => V4L2_DEVICE
            .captures_iter(output)
            .map(|c| c[1].trim_start_matches("/dev/").to_string())
            .collect(),
    }
}

/// List `video*` entries of a device directory, sorted by name.
pub fn scan_device_dir(dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to read device directory");
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with("video"))
        .collect();
    names.sort();
    names
}

/// Probe the OS for capture devices through the encoder.
///
/// On Unix the `/dev` directory is scanned when the encoder listing yields
/// nothing. Probe failures produce an empty list.
pub async fn probe_devices(launcher: &ProcessLauncher) -> Vec<String> {
    let output = match launcher.probe_devices().await {
        Ok(output) => output,
        Err(e) => {
            warn!(error = %e, "Device probe failed");
            String::new()
        }
    };

    let mut names = parse_device_list(launcher.platform(), &output);
    if names.is_empty() && launcher.platform() == Platform::Unix {
        names = scan_device_dir(Path::new("/dev"));
    }
    names
}

/// Process-wide camera list.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<Arc<Vec<String>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_devices(devices: Vec<String>) -> Self {
        Self {
            devices: RwLock::new(Arc::new(devices)),
        }
    }

    /// Replace the whole device list.
    pub fn replace(&self, devices: Vec<String>) {
        info!(count = devices.len(), devices = ?devices, "Camera registry updated");
        *self.devices.write() = Arc::new(devices);
    }

    fn snapshot(&self) -> Arc<Vec<String>> {
        self.devices.read().clone()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current cameras as handle/name/description triples.
    pub fn list(&self) -> Vec<CameraInfo> {
        self.snapshot()
            .iter()
            .enumerate()
            .map(|(idx, name)| CameraInfo {
                camera_id: idx + 1,
                name: name.clone(),
                description: name.clone(),
            })
            .collect()
    }

    /// Device name for a 1-based handle.
    pub fn resolve(&self, handle: i64) -> Option<String> {
        let idx = usize::try_from(handle).ok()?.checked_sub(1)?;
        self.snapshot().get(idx).cloned()
    }
}
