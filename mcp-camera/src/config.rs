//! Environment-driven configuration.
//!
//! All settings are optional. Values that fail to parse fall back to their
//! defaults. They are kept on the config and reported with a warning by
//! [`AppConfig::log_ignored`] once logging is up, instead of aborting start-up.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::server::ApiServerConfig;

/// Encoder (ffmpeg) invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Path to the ffmpeg binary.
    pub binary_path: String,
    /// Extra arguments placed before every generated argument list.
    #[serde(default)]
    pub input_args: Vec<String>,
    /// Target bitrate of the piped stream profile.
    pub video_bitrate: String,
    /// Frame rate of the piped stream profile.
    pub video_fps: u32,
    /// Resolution (`WxH`) of the piped stream profile.
    pub video_resolution: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            input_args: Vec::new(),
            video_bitrate: "800k".to_string(),
            video_fps: 25,
            video_resolution: "640x480".to_string(),
        }
    }
}

/// Session lifetimes.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// How long a finished recording stays queryable before it is purged.
    pub cleanup_grace: Duration,
    /// How long a stream reservation waits for its first connection.
    pub reservation_expiry: Duration,
    /// How long a graceful stop may take before the encoder is killed.
    pub stop_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cleanup_grace: Duration::from_secs(1800),
            reservation_expiry: Duration::from_millis(300_000),
            stop_timeout: Duration::from_secs(10),
        }
    }
}

/// Filename prefixes for produced artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub photo_prefix: String,
    pub video_prefix: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            photo_prefix: "image".to_string(),
            video_prefix: "video".to_string(),
        }
    }
}

/// Identity reported to MCP clients during `initialize`.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "mcp-camera-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Logging options.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Level applied to this crate when `RUST_LOG` is not set.
    pub level: String,
    /// Optional file that receives a copy of every log line.
    pub file_path: Option<String>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
        }
    }
}

/// An environment value that could not be parsed and was replaced by its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredValue {
    pub key: &'static str,
    pub value: String,
}

/// Complete application configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub encoder: EncoderConfig,
    pub sessions: SessionConfig,
    pub artifacts: ArtifactConfig,
    pub server: ServerInfo,
    pub api: ApiServerConfig,
    pub log: LogOptions,
    /// Values dropped while loading, in lookup order.
    pub ignored: Vec<IgnoredValue>,
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut ignored = Vec::new();

        if let Some(path) = get("FFMPEG_PATH") {
            config.encoder.binary_path = path;
        }
        if let Some(bitrate) = get("VIDEO_BITRATE") {
            config.encoder.video_bitrate = bitrate;
        }
        if let Some(fps) = parse_var(&get, "VIDEO_FPS", &mut ignored) {
            config.encoder.video_fps = fps;
        }
        if let Some(resolution) = get("VIDEO_RESOLUTION") {
            config.encoder.video_resolution = resolution;
        }

        if let Some(secs) =
            parse_var::<u64, _>(&get, "FINISHED_VIDEO_CLEAN_SPAN_SECOND", &mut ignored)
        {
            config.sessions.cleanup_grace = Duration::from_secs(secs);
        }
        if let Some(ms) =
            parse_var::<u64, _>(&get, "STREAM_URL_EXPIRE_MS", &mut ignored)
        {
            config.sessions.reservation_expiry = Duration::from_millis(ms);
        }
        if let Some(secs) =
            parse_var::<u64, _>(&get, "STOP_TIMEOUT_SECS", &mut ignored)
        {
            config.sessions.stop_timeout = Duration::from_secs(secs);
        }

        if let Some(prefix) = get("PHOTO_PREFIX") {
            config.artifacts.photo_prefix = prefix;
        }
        if let Some(prefix) = get("VIDEO_PREFIX") {
            config.artifacts.video_prefix = prefix;
        }

        if let Some(name) = get("MCP_SERVER_NAME") {
            config.server.name = name;
        }
        if let Some(version) = get("MCP_SERVER_VERSION") {
            config.server.version = version;
        }

        if let Some(bind_address) = get("API_BIND_ADDRESS") {
            config.api.bind_address = bind_address;
        }
        if let Some(port) = parse_var(&get, "PORT", &mut ignored) {
            config.api.port = port;
        }

        if let Some(level) = get("LOG_LEVEL") {
            config.log.level = level;
        }
        config.log.file_path = get("LOG_FILEPATH");

        config.ignored = ignored;
        config
    }

    /// Warn about every value dropped while loading.
    ///
    /// Loading runs before the subscriber is installed, so this is called
    /// once logging is initialised.
    pub fn log_ignored(&self) {
        for IgnoredValue { key, value } in &self.ignored {
            warn!(key, value = %value, "Ignoring unparseable configuration value");
        }
    }
}

fn parse_var<T, G>(get: &G, key: &'static str, ignored: &mut Vec<IgnoredValue>) -> Option<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            ignored.push(IgnoredValue { key, value: raw });
            None
        }
    }
}
