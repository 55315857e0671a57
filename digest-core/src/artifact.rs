use crate::error::CoreError;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Writes `contents` to a file that must not exist yet.
///
/// The bytes are staged in a temporary file next to `path`, synced, then
/// linked into place, so `path` either holds the complete contents or does
/// not exist. Returns `Ok(false)` without touching anything when the file is
/// already present; run artifacts are immutable once written.
pub async fn write_new(path: &Path, contents: &[u8]) -> Result<bool, CoreError> {
    let path = path.to_path_buf();
    let contents = contents.to_vec();
    tokio::task::spawn_blocking(move || persist_new(&path, &contents))
        .await
        .map_err(|e| CoreError::Internal {
            message: format!("artifact write task failed: {}", e),
        })?
}

fn persist_new(path: &Path, contents: &[u8]) -> Result<bool, CoreError> {
    if path.exists() {
        return Ok(false);
    }
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut staged = NamedTempFile::new_in(&dir)?;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;

    match staged.persist_noclobber(path) {
        Ok(_) => Ok(true),
        // Lost a race with another writer; theirs stands.
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_second_write_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("artifact.json");

        assert!(write_new(&path, b"first").await.unwrap());
        assert!(!write_new(&path, b"second").await.unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first");
    }

    #[tokio::test]
    async fn test_no_staging_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("artifact.json");
        write_new(&path, b"{}").await.unwrap();
        write_new(&path, b"[]").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["artifact.json"]);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_target() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("artifact.json");

        assert!(write_new(&path, b"{}").await.is_err());
        assert!(!path.exists());
    }
}
