//! Filesystem helpers shared across modules.
//!
//! These helpers attach the operation and path to IO errors so failures in
//! tool calls point at the directory that could not be prepared.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::io_path(op, path, e))
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::io_path(op, path, e))
}

/// Make `dir` absolute against the current working directory.
pub fn absolutize(dir: &Path) -> Result<PathBuf> {
    if dir.is_absolute() {
        return Ok(dir.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| Error::io_path("reading current directory", dir, e))?;
    Ok(cwd.join(dir))
}

/// Resolve a caller-supplied output directory and make sure it exists.
pub async fn resolve_output_dir(dir: &Path) -> Result<PathBuf> {
    let abs = absolutize(dir)?;
    ensure_dir_all_with_op("creating output directory", &abs).await?;
    Ok(abs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_resolve_output_dir_creates_nested_directories() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("level1").join("level2");

        assert!(!nested.exists());
        let resolved = resolve_output_dir(&nested).await.unwrap();
        assert_eq!(resolved, nested);
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_resolve_output_dir_accepts_existing_directory() {
        let temp = TempDir::new().unwrap();
        let resolved = resolve_output_dir(temp.path()).await.unwrap();
        assert_eq!(resolved, temp.path());
    }

    #[test]
    fn test_absolutize_relative_path_uses_cwd() {
        let abs = absolutize(Path::new("captures")).unwrap();
        assert!(abs.is_absolute());
        assert!(abs.ends_with("captures"));
    }

    #[tokio::test]
    async fn test_resolve_output_dir_reports_path_on_failure() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();

        let err = resolve_output_dir(&file.join("sub")).await.unwrap_err();
        assert!(matches!(err, Error::IoPath { .. }));
        assert!(err.to_string().contains("creating output directory"));
    }
}
