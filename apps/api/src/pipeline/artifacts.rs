//! Artifact storage. One directory per run so a failed run can be discarded whole.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::pipeline::models::ArtifactId;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Artifact storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, id: &ArtifactId, content: Bytes) -> Result<(), ArtifactError>;

    async fn get(&self, id: &ArtifactId) -> Result<Bytes, ArtifactError>;

    /// Deletes everything stored for the run. Missing runs are not an error.
    /// Once this returns, no earlier `put` for the run can still land on disk,
    /// even if its caller was dropped mid-write.
    async fn discard_run(&self, run_id: Uuid) -> Result<(), ArtifactError>;
}

/// Stores artifacts at `<root>/<run_id>/<file_name>`.
///
/// Each write runs on the blocking pool and holds a shared lock on its run
/// until the file is renamed into place. `discard_run` takes the same lock
/// exclusively, so it waits out writes whose callers have gone away.
pub struct FsArtifactStore {
    root: PathBuf,
    runs: Mutex<HashMap<Uuid, Arc<RwLock<()>>>>,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            runs: Mutex::new(HashMap::new()),
        }
    }

    fn run_dir(&self, run_id: Uuid) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    fn path_of(&self, id: &ArtifactId) -> PathBuf {
        self.run_dir(id.run_id).join(&id.file_name)
    }

    async fn run_lock(&self, run_id: Uuid) -> Arc<RwLock<()>> {
        self.runs.lock().await.entry(run_id).or_default().clone()
    }

    /// Drops the lock entry once nothing else holds it.
    async fn release(&self, run_id: Uuid) {
        let mut runs = self.runs.lock().await;
        if runs.get(&run_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            runs.remove(&run_id);
        }
    }
}

/// Writes next to the target and renames, so readers never see a partial file.
fn write_atomically(dir: &Path, path: &Path, content: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".partial");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, id: &ArtifactId, content: Bytes) -> Result<(), ArtifactError> {
        let guard = self.run_lock(id.run_id).await.read_owned().await;
        let dir = self.run_dir(id.run_id);
        let path = self.path_of(id);
        let len = content.len();

        // the task owns the guard, so a dropped caller cannot orphan the write
        let written = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            write_atomically(&dir, &path, &content)
        })
        .await;

        self.release(id.run_id).await;
        written??;
        debug!(artifact = %id, bytes = len, "Artifact stored");
        Ok(())
    }

    async fn get(&self, id: &ArtifactId) -> Result<Bytes, ArtifactError> {
        match tokio::fs::read(self.path_of(id)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtifactError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn discard_run(&self, run_id: Uuid) -> Result<(), ArtifactError> {
        let lock = self.run_lock(run_id).await;
        let exclusive = lock.write().await;
        let removed = tokio::fs::remove_dir_all(self.run_dir(run_id)).await;
        drop(exclusive);
        drop(lock);
        self.release(run_id).await;

        match removed {
            Ok(()) => {
                warn!(run_id = %run_id, "Discarded run artifacts");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_put_then_get_returns_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let id = ArtifactId::new(Uuid::new_v4(), "Letter_Acme_Engineer.md").unwrap();

        store.put(&id, Bytes::from_static(b"hello")).await.unwrap();

        assert_eq!(store.get(&id).await.unwrap(), Bytes::from_static(b"hello"));
        assert!(dir
            .path()
            .join(id.run_id.to_string())
            .join("Letter_Acme_Engineer.md")
            .exists());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let id = ArtifactId::new(Uuid::new_v4(), "missing.pdf").unwrap();
        assert!(matches!(
            store.get(&id).await,
            Err(ArtifactError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_discard_run_removes_only_that_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let doomed = ArtifactId::new(Uuid::new_v4(), "a.pdf").unwrap();
        let kept = ArtifactId::new(Uuid::new_v4(), "b.pdf").unwrap();
        store.put(&doomed, Bytes::from_static(b"x")).await.unwrap();
        store.put(&kept, Bytes::from_static(b"y")).await.unwrap();

        store.discard_run(doomed.run_id).await.unwrap();

        assert!(store.get(&doomed).await.is_err());
        assert!(store.get(&kept).await.is_ok());
        // discarding twice is fine
        store.discard_run(doomed.run_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_discard_waits_for_abandoned_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let id = ArtifactId::new(Uuid::new_v4(), "Letter_Acme_Engineer.pdf").unwrap();
        let content = Bytes::from(vec![b'x'; 16 * 1024 * 1024]);

        // polled once, then dropped while the blocking write is in flight
        let _ = tokio::time::timeout(Duration::ZERO, store.put(&id, content)).await;

        store.discard_run(id.run_id).await.unwrap();
        let run_dir = dir.path().join(id.run_id.to_string());
        assert!(!run_dir.exists());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!run_dir.exists());
        assert!(store.runs.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_completed_put_leaves_no_partial_file_or_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let id = ArtifactId::new(Uuid::new_v4(), "Letter_Acme_Engineer.md").unwrap();

        store.put(&id, Bytes::from_static(b"hello")).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join(id.run_id.to_string()))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Letter_Acme_Engineer.md".to_string()]);
        assert!(store.runs.lock().await.is_empty());
    }
}
