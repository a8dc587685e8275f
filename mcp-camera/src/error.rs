//! Application-wide error types.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// None of these are fatal to the serving process: every camera operation
/// reports its failure back to the caller as a structured result.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid camera handle: {handle}")]
    InvalidHandle { handle: i64 },

    #[error("Invalid camera handle: {value}")]
    InvalidHandleValue { value: f64 },

    #[error("Failed to run encoder: {reason}")]
    SpawnFailure { reason: String },

    #[error("Session not found: {id}")]
    NotFound { id: String },

    #[error("Stream already consumed: {id}")]
    AlreadyConsumed { id: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} at {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Stable, serializable error code carried in failure payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidHandle,
    SpawnFailure,
    NotFound,
    AlreadyConsumed,
    Configuration,
    Serialization,
    Io,
}

impl Error {
    pub fn invalid_handle(handle: i64) -> Self {
        Self::InvalidHandle { handle }
    }

    /// A handle that is not an integer at all, such as `1.5`.
    pub fn invalid_handle_value(value: f64) -> Self {
        Self::InvalidHandleValue { value }
    }

    pub fn spawn_failure(reason: impl Into<String>) -> Self {
        Self::SpawnFailure {
            reason: reason.into(),
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn already_consumed(id: impl Into<String>) -> Self {
        Self::AlreadyConsumed { id: id.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidHandle { .. } | Self::InvalidHandleValue { .. } => {
                ErrorKind::InvalidHandle
            }
            Self::SpawnFailure { .. } => ErrorKind::SpawnFailure,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyConsumed { .. } => ErrorKind::AlreadyConsumed,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Io(_) | Self::IoPath { .. } => ErrorKind::Io,
        }
    }

    /// True for every condition a caller sees as "no such session":
    /// unknown, expired, or already consumed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::AlreadyConsumed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&Error::already_consumed("abc").kind()).unwrap();
        assert_eq!(json, "\"ALREADY_CONSUMED\"");
    }

    #[test]
    fn test_already_consumed_counts_as_not_found() {
        assert!(Error::not_found("a").is_not_found());
        assert!(Error::already_consumed("a").is_not_found());
        assert!(!Error::invalid_handle(0).is_not_found());
        assert!(!Error::spawn_failure("boom").is_not_found());
    }

    #[test]
    fn test_fractional_handle_is_an_invalid_handle() {
        let err = Error::invalid_handle_value(1.5);
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);
        assert_eq!(err.to_string(), "Invalid camera handle: 1.5");
    }

    #[test]
    fn test_io_path_message_includes_path() {
        let err = Error::io_path(
            "creating output directory",
            Path::new("/nope/dir"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        let msg = err.to_string();
        assert!(msg.contains("creating output directory"));
        assert!(msg.contains("/nope/dir"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
