//! Batch checkpoints: what a scheduler run has already completed or failed.
//!
//! The file format is
//! `{ "completed": [key], "failed": [{ "key", "error", "terminal" }] }`,
//! rewritten in full after every item. Terminal failures are never retried
//! by later runs. [`CheckpointLease`] keeps a second
//! scheduler from writing the same checkpoint concurrently.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use postforge_shared::{PostforgeError, Result};

/// A key that failed, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedKey {
    pub key: String,
    pub error: String,
    /// The source can never succeed (missing video, no captions).
    #[serde(default)]
    pub terminal: bool,
}

/// Persisted progress of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCheckpoint {
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub failed: Vec<FailedKey>,
}

impl BatchCheckpoint {
    pub fn is_completed(&self, key: &str) -> bool {
        self.completed.iter().any(|k| k == key)
    }

    /// Completed, or failed in a way a retry cannot fix.
    pub fn is_settled(&self, key: &str) -> bool {
        self.is_completed(key) || self.failed.iter().any(|f| f.terminal && f.key == key)
    }

    /// Record a success; clears any earlier failure for the key.
    pub fn mark_completed(&mut self, key: &str) {
        self.failed.retain(|f| f.key != key);
        if !self.is_completed(key) {
            self.completed.push(key.to_string());
        }
    }

    /// Record a failure, replacing an earlier entry for the same key.
    pub fn mark_failed(&mut self, key: &str, error: impl Into<String>, terminal: bool) {
        let error = error.into();
        match self.failed.iter_mut().find(|f| f.key == key) {
            Some(existing) => {
                existing.error = error;
                existing.terminal = terminal;
            }
            None => self.failed.push(FailedKey {
                key: key.to_string(),
                error,
                terminal,
            }),
        }
    }
}

/// Where a scheduler keeps its [`BatchCheckpoint`].
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The stored checkpoint, or an empty one if nothing was saved yet.
    async fn load(&self) -> Result<BatchCheckpoint>;

    async fn save(&self, checkpoint: &BatchCheckpoint) -> Result<()>;
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// JSON file checkpoint, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Checkpoint for a named batch inside `dir` (`<dir>/<name>.json`).
    pub fn for_batch(dir: &Path, name: &str) -> Self {
        Self::new(dir.join(format!("{name}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the single-writer lease for this checkpoint.
    pub fn lease(&self) -> Result<CheckpointLease> {
        CheckpointLease::acquire(&self.path)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<BatchCheckpoint> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BatchCheckpoint::default());
            }
            Err(e) => return Err(PostforgeError::io(&self.path, e)),
        };

        serde_json::from_str(&content).map_err(|e| {
            PostforgeError::parse(format!("checkpoint {}: {e}", self.path.display()))
        })
    }

    async fn save(&self, checkpoint: &BatchCheckpoint) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PostforgeError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| PostforgeError::Storage(format!("encode checkpoint: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| PostforgeError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| PostforgeError::io(&self.path, e))?;

        debug!(
            path = %self.path.display(),
            completed = checkpoint.completed.len(),
            failed = checkpoint.failed.len(),
            "checkpoint saved"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

/// In-process checkpoint, for tests and one-off runs.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    state: Mutex<BatchCheckpoint>,
}

impl MemoryCheckpointStore {
    pub fn new(initial: BatchCheckpoint) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    pub fn snapshot(&self) -> BatchCheckpoint {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<BatchCheckpoint> {
        Ok(self.snapshot())
    }

    async fn save(&self, checkpoint: &BatchCheckpoint) -> Result<()> {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = checkpoint.clone();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Lease
// ---------------------------------------------------------------------------

/// Exclusive right to run the batch that owns a checkpoint.
///
/// Held as a `<checkpoint>.lock` file created with `create_new`, removed on
/// drop. A lock left behind by a crashed process must be deleted by hand.
#[derive(Debug)]
pub struct CheckpointLease {
    path: PathBuf,
}

impl CheckpointLease {
    pub fn acquire(checkpoint_path: &Path) -> Result<Self> {
        let mut lock_name = checkpoint_path.as_os_str().to_owned();
        lock_name.push(".lock");
        let path = PathBuf::from(lock_name);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PostforgeError::io(parent, e))?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PostforgeError::Conflict(format!(
                    "another batch run holds {}",
                    path.display()
                )));
            }
            Err(e) => return Err(PostforgeError::io(&path, e)),
        };

        let stamp = format!(
            "pid={} at={}\n",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );
        file.write_all(stamp.as_bytes())
            .map_err(|e| PostforgeError::io(&path, e))?;

        debug!(lock = %path.display(), "batch lease acquired");
        Ok(Self { path })
    }
}

impl Drop for CheckpointLease {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "failed to release batch lease");
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("pf_ckpt_{}", Uuid::now_v7()))
            .join("daily.json")
    }

    #[test]
    fn mark_failed_then_completed() {
        let mut checkpoint = BatchCheckpoint::default();
        checkpoint.mark_failed("v1", "timeout", false);
        checkpoint.mark_failed("v1", "quota", false);
        assert_eq!(checkpoint.failed.len(), 1);
        assert_eq!(checkpoint.failed[0].error, "quota");
        assert!(!checkpoint.is_settled("v1"));

        checkpoint.mark_completed("v1");
        checkpoint.mark_completed("v1");
        assert!(checkpoint.failed.is_empty());
        assert_eq!(checkpoint.completed, vec!["v1"]);
    }

    #[tokio::test]
    async fn file_store_round_trip_and_format() {
        let store = FileCheckpointStore::new(temp_path());
        assert_eq!(store.load().await.unwrap(), BatchCheckpoint::default());

        let mut checkpoint = BatchCheckpoint::default();
        checkpoint.mark_completed("v1");
        checkpoint.mark_failed("v2", "transcript unavailable", true);
        store.save(&checkpoint).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["completed"][0], "v1");
        assert_eq!(raw["failed"][0]["key"], "v2");
        assert_eq!(raw["failed"][0]["error"], "transcript unavailable");
        assert_eq!(raw["failed"][0]["terminal"], true);

        assert_eq!(store.load().await.unwrap(), checkpoint);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn terminal_failures_are_settled() {
        let mut checkpoint = BatchCheckpoint::default();
        checkpoint.mark_failed("nocaps", "transcript not available", true);
        assert!(checkpoint.is_settled("nocaps"));
        assert!(!checkpoint.is_completed("nocaps"));

        // Older files have no terminal flag
        let old: BatchCheckpoint =
            serde_json::from_str(r#"{"failed": [{"key": "v9", "error": "timeout"}]}"#).unwrap();
        assert!(!old.is_settled("v9"));
    }

    #[tokio::test]
    async fn corrupt_file_is_parse_error() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();
        let err = FileCheckpointStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, PostforgeError::Parse { .. }));
    }

    #[test]
    fn lease_is_exclusive_until_dropped() {
        let store = FileCheckpointStore::new(temp_path());
        let lease = store.lease().unwrap();

        let err = store.lease().unwrap_err();
        assert!(matches!(err, PostforgeError::Conflict(_)));

        drop(lease);
        assert!(store.lease().is_ok());
    }
}
