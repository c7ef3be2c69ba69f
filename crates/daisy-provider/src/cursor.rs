//! Durable cursor storage
//!
//! The cursor is the highest query id that has reached a terminal outcome.
//! It only ever moves forward by one resolved id at a time, and it is
//! persisted before the loop moves on so a restart never re-pays for work.

use chrono::{DateTime, Utc};
use daisy_core::QueryId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("cursor io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cursor file {path} is not valid: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cursor store unavailable: {0}")]
    Unavailable(String),
}

/// On-disk cursor layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRecord {
    pub app_id: u64,
    pub last_processed_id: QueryId,
    pub updated_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait CursorStore: Send + Sync {
    /// Last persisted cursor for `app_id`, or 0 when none exists.
    async fn load(&self, app_id: u64) -> Result<QueryId, CursorError>;

    async fn store(&self, app_id: u64, last_processed: QueryId) -> Result<(), CursorError>;
}

/// JSON file, replaced atomically through a sibling temp file.
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
            .unwrap_or_else(|| "cursor.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Persist the rename itself. Not every platform can open a directory,
    /// so a failure here is logged rather than returned.
    async fn sync_parent(&self) {
        let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return;
        };
        let synced = match tokio::fs::File::open(parent).await {
            Ok(dir) => dir.sync_all().await,
            Err(e) => Err(e),
        };
        if let Err(e) = synced {
            debug!(path = %parent.display(), error = %e, "cursor directory fsync skipped");
        }
    }

    fn io_err(&self, source: std::io::Error) -> CursorError {
        CursorError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait::async_trait]
impl CursorStore for FileCursorStore {
    async fn load(&self, app_id: u64) -> Result<QueryId, CursorError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cursor file, starting at 0");
                return Ok(QueryId(0));
            }
            Err(e) => return Err(self.io_err(e)),
        };
        let record: CursorRecord =
            serde_json::from_slice(&bytes).map_err(|source| CursorError::Corrupt {
                path: self.path.display().to_string(),
                source,
            })?;
        if record.app_id != app_id {
            warn!(
                path = %self.path.display(),
                file_app_id = record.app_id,
                app_id,
                "cursor file belongs to a different app, starting at 0"
            );
            return Ok(QueryId(0));
        }
        Ok(record.last_processed_id)
    }

    async fn store(&self, app_id: u64, last_processed: QueryId) -> Result<(), CursorError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_err(e))?;
            }
        }
        let record = CursorRecord {
            app_id,
            last_processed_id: last_processed,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record).map_err(|source| CursorError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })?;
        let tmp = self.tmp_path();
        // data must hit the disk before the rename makes it visible
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| self.io_err(e))?;
        file.write_all(&json).await.map_err(|e| self.io_err(e))?;
        file.sync_all().await.map_err(|e| self.io_err(e))?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        self.sync_parent().await;
        Ok(())
    }
}

/// Process-local cursor. Can be told to fail its next write.
#[derive(Default)]
pub struct MemoryCursorStore {
    record: Mutex<Option<(u64, QueryId)>>,
    fail_next_store: AtomicBool,
    writes: Mutex<Vec<QueryId>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(app_id: u64, last_processed: QueryId) -> Self {
        let store = Self::default();
        *store.record.lock().unwrap_or_else(|e| e.into_inner()) = Some((app_id, last_processed));
        store
    }

    pub fn fail_next_store(&self) {
        self.fail_next_store.store(true, Ordering::SeqCst);
    }

    /// Every value successfully stored, oldest first.
    pub fn writes(&self) -> Vec<QueryId> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self, app_id: u64) -> Result<QueryId, CursorError> {
        let record = *self.record.lock().unwrap_or_else(|e| e.into_inner());
        Ok(match record {
            Some((stored_app, id)) if stored_app == app_id => id,
            _ => QueryId(0),
        })
    }

    async fn store(&self, app_id: u64, last_processed: QueryId) -> Result<(), CursorError> {
        if self.fail_next_store.swap(false, Ordering::SeqCst) {
            return Err(CursorError::Unavailable("scripted store failure".into()));
        }
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = Some((app_id, last_processed));
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(last_processed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_is_scoped_by_app() {
        let store = MemoryCursorStore::starting_at(7, QueryId(3));
        assert_eq!(store.load(7).await.unwrap(), QueryId(3));
        assert_eq!(store.load(8).await.unwrap(), QueryId(0));
    }

    #[tokio::test]
    async fn scripted_failure_hits_one_write() {
        let store = MemoryCursorStore::new();
        store.fail_next_store();
        assert!(store.store(1, QueryId(1)).await.is_err());
        store.store(1, QueryId(1)).await.unwrap();
        assert_eq!(store.writes(), vec![QueryId(1)]);
    }

    #[test]
    fn tmp_path_is_a_sibling() {
        let store = FileCursorStore::new("/var/lib/daisy/cursor.json");
        assert_eq!(store.tmp_path(), PathBuf::from("/var/lib/daisy/cursor.json.tmp"));
    }
}
