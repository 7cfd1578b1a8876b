//! Semaphore and marker files
//!
//! Containers coordinate only through the presence of marker files. The
//! wrapper and the watcher reach them through [`MarkerStore`] so their
//! state machines can run against an in-memory store in tests.

use std::io;
use std::path::Path;

use async_trait::async_trait;

#[async_trait]
pub trait MarkerStore: Send + Sync {
    async fn exists(&self, path: &Path) -> io::Result<bool>;

    /// Remove a marker; removing an absent marker is not an error
    async fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Markers on the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsMarkers;

#[async_trait]
impl MarkerStore for FsMarkers {
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        tokio::fs::try_exists(path).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_markers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steps-running");
        std::fs::write(&path, b"").unwrap();

        assert!(FsMarkers.exists(&path).await.unwrap());
        FsMarkers.remove(&path).await.unwrap();
        assert!(!FsMarkers.exists(&path).await.unwrap());

        // second removal is a no-op
        FsMarkers.remove(&path).await.unwrap();
    }
}
