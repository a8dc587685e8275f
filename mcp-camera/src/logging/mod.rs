//! Logging setup.
//!
//! Console output always goes to stderr: in stdio mode stdout carries the
//! JSON-RPC channel and must stay clean. When `LOG_FILEPATH` is set every line
//! is also appended to that file through a non-blocking writer.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::LogOptions;
use crate::utils::fs;
use crate::{Error, Result};

/// Modules whose level follows `LOG_LEVEL`; everything else stays quieter.
const CRATE_TARGETS: &[&str] = &["mcp_camera", "process_utils"];

/// Timer that stamps lines in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Filter directive used when `RUST_LOG` is not set.
pub fn default_filter(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    let mut directives: Vec<String> = CRATE_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect();
    directives.push("tower_http=warn".to_string());
    directives.join(",")
}

/// Split a log file path into the directory and file name the appender wants.
fn split_log_path(path: &Path) -> Result<(PathBuf, String)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::config(format!("invalid log file path: {}", path.display())))?
        .to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file_name))
}

/// Install the global subscriber.
///
/// Returns the file writer's guard when file output is enabled; keep it alive
/// for the lifetime of the process or buffered lines are lost.
pub fn init_logging(options: &LogOptions) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(default_filter(&options.level))
            .map_err(|e| Error::config(format!("invalid LOG_LEVEL {:?}: {e}", options.level)))
    })?;

    let (file_layer, guard) = match options.file_path.as_deref() {
        Some(path) => {
            let (dir, file_name) = split_log_path(Path::new(path))?;
            fs::ensure_dir_all_sync_with_op("creating log directory", &dir)?;

            let appender = tracing_appender::rolling::never(&dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_timer(LocalTimer),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::config(format!("Failed to set global default subscriber: {e}")))?;

    Ok(guard)
}
