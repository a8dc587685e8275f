//! Artifact filename construction.
//!
//! Photos and videos are named `{prefix}{camera}{timestamp}.{ext}` where the
//! camera part is reduced to a filesystem-safe alphabet and the timestamp is a
//! compact UTC stamp with millisecond precision.

use chrono::{DateTime, Utc};

/// Replace every character outside `[A-Za-z0-9_-]` with an underscore.
///
/// # Examples
///
/// ```
/// use mcp_camera::utils::filename::sanitize_camera_id;
///
/// assert_eq!(sanitize_camera_id("1"), "1");
/// assert_eq!(sanitize_camera_id("usb cam/2"), "usb_cam_2");
/// ```
pub fn sanitize_camera_id(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Format a timestamp as `YYYYMMDDHHMMSSmmm`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M%S%3f").to_string()
}

/// Current UTC time formatted by [`format_timestamp`].
pub fn artifact_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Filename for a still capture.
pub fn photo_filename(prefix: &str, camera: &str, timestamp: &str) -> String {
    format!("{prefix}{}{timestamp}.jpg", sanitize_camera_id(camera))
}

/// Filename for a file-backed recording.
pub fn video_filename(prefix: &str, camera: &str, timestamp: &str) -> String {
    format!("{prefix}{}{timestamp}.mp4", sanitize_camera_id(camera))
}
