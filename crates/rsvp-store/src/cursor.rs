//! Durable high-water mark for the cursor-based backend.
//!
//! # Invariants
//!
//! - **Non-decreasing**: `save` never persists a cursor older than the one
//!   already stored.
//! - **Absent means epoch**: a missing cursor file loads as
//!   [`NotifyCursor::epoch`]; a present but unreadable one is an error, never
//!   silently reset (a reset would re-notify every guest).
//! - **Atomic replace**: the file is written to a sibling temp path and
//!   renamed over the old one, so a crash leaves either the old or the new
//!   cursor, never a torn write.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rsvp_schemas::NotifyCursor;
use tokio::sync::RwLock;

use crate::StoreError;

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self) -> Result<NotifyCursor, StoreError>;

    async fn save(&self, cursor: NotifyCursor) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// File-backed
// ---------------------------------------------------------------------------

/// Cursor persisted as a small JSON document on local disk.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn load(&self) -> Result<NotifyCursor, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(NotifyCursor::epoch());
            }
            Err(e) => {
                return Err(StoreError::Unavailable(format!(
                    "read cursor {}: {e}",
                    self.path.display()
                )))
            }
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::Rejected(format!("decode cursor {}: {e}", self.path.display()))
        })
    }

    async fn save(&self, cursor: NotifyCursor) -> Result<(), StoreError> {
        let current = self.load().await?;
        let next = current.advanced_to(cursor.last_created_at);
        if next == current {
            let on_disk = tokio::fs::try_exists(&self.path).await.map_err(|e| {
                StoreError::Unavailable(format!("stat cursor {}: {e}", self.path.display()))
            })?;
            if on_disk {
                return Ok(());
            }
        }

        let body = serde_json::to_vec_pretty(&next)
            .map_err(|e| StoreError::Rejected(format!("encode cursor: {e}")))?;

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &body).await.map_err(|e| {
            StoreError::Unavailable(format!("write cursor {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            StoreError::Unavailable(format!("replace cursor {}: {e}", self.path.display()))
        })?;

        tracing::debug!(cursor = %next.last_created_at, "cursor persisted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local cursor. Not durable; for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    inner: RwLock<NotifyCursor>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(cursor: NotifyCursor) -> Self {
        Self {
            inner: RwLock::new(cursor),
        }
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self) -> Result<NotifyCursor, StoreError> {
        Ok(*self.inner.read().await)
    }

    async fn save(&self, cursor: NotifyCursor) -> Result<(), StoreError> {
        let mut cur = self.inner.write().await;
        *cur = cur.advanced_to(cursor.last_created_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> NotifyCursor {
        NotifyCursor::at(Utc.timestamp_opt(secs, 0).unwrap())
    }

    #[tokio::test]
    async fn missing_file_loads_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCursorStore::new(dir.path().join("cursor.json"));
        assert_eq!(store.load().await.unwrap(), NotifyCursor::epoch());
    }

    #[tokio::test]
    async fn save_then_load_survives_a_new_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");

        FileCursorStore::new(&path).save(at(1_700_000_000)).await.unwrap();

        // A fresh handle models a process restart.
        let reloaded = FileCursorStore::new(&path).load().await.unwrap();
        assert_eq!(reloaded, at(1_700_000_000));
        assert!(!dir.path().join("cursor.json.tmp").exists());
    }

    #[tokio::test]
    async fn unchanged_cursor_is_written_only_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");
        let store = FileCursorStore::new(&path);

        store.save(NotifyCursor::epoch()).await.unwrap();
        assert!(tokio::fs::try_exists(&path).await.unwrap());

        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
        store.save(NotifyCursor::epoch()).await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), modified);
        assert_eq!(store.load().await.unwrap(), NotifyCursor::epoch());
    }

    #[tokio::test]
    async fn save_never_moves_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCursorStore::new(dir.path().join("cursor.json"));
        store.save(at(200)).await.unwrap();
        store.save(at(100)).await.unwrap();
        assert_eq!(store.load().await.unwrap(), at(200));
    }

    #[tokio::test]
    async fn corrupt_file_is_rejected_not_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = FileCursorStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn memory_store_is_monotonic() {
        let store = MemoryCursorStore::starting_at(at(50));
        store.save(at(10)).await.unwrap();
        assert_eq!(store.load().await.unwrap(), at(50));
        store.save(at(60)).await.unwrap();
        assert_eq!(store.load().await.unwrap(), at(60));
    }
}
