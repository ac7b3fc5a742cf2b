use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use super::models::FileRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

type Records = HashMap<String, FileRecord>;

/// Process-wide mapping from short id to [`FileRecord`], persisted as a
/// full JSON snapshot after every mutation.
///
/// Mutations hold the write lock until their snapshot has been written, so
/// snapshots land on disk in mutation order and readers never observe a
/// batch half-applied.
pub struct MetadataStore {
    path: Arc<PathBuf>,
    records: Arc<RwLock<Records>>,
}

impl Clone for MetadataStore {
    fn clone(&self) -> Self {
        Self {
            path: Arc::clone(&self.path),
            records: Arc::clone(&self.records),
        }
    }
}

impl MetadataStore {
    /// Create an empty store that will persist to `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: Arc::new(path.as_ref().to_path_buf()),
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Load the snapshot at `path`. A missing or unreadable snapshot yields
    /// an empty store.
    pub async fn restore<P: AsRef<Path>>(path: P) -> Self {
        let store = Self::new(path);

        let records = match tokio::fs::read(store.path.as_path()).await {
            Ok(data) => match serde_json::from_slice::<Records>(&data) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(
                        path = %store.path.display(),
                        error = %e,
                        "Metadata snapshot is corrupt, starting with an empty store"
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!(
                    path = %store.path.display(),
                    error = %e,
                    "Failed to read metadata snapshot, starting with an empty store"
                );
                HashMap::new()
            }
        };

        tracing::info!(records = records.len(), "Metadata store restored");
        *store.records.write().await = records;
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, id: &str) -> Option<FileRecord> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.records.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// All live records, in no particular order.
    pub async fn all(&self) -> Vec<FileRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// Insert a record and persist. A failed snapshot is logged; the
    /// in-memory insert stands.
    pub async fn insert(&self, record: FileRecord) {
        let mut records = self.records.write().await;
        let id = record.id.clone();
        records.insert(id.clone(), record);
        self.persist_logged(&records).await;
        tracing::debug!(file_id = %id, "Inserted file record");
    }

    /// Remove a record and persist. Returns the removed record, if any.
    pub async fn delete(&self, id: &str) -> Option<FileRecord> {
        let mut records = self.records.write().await;
        let removed = records.remove(id);
        if removed.is_some() {
            self.persist_logged(&records).await;
            tracing::debug!(file_id = %id, "Deleted file record");
        }
        removed
    }

    /// Remove every record that expired before `now`, persisting once for
    /// the whole batch.
    pub async fn remove_expired(&self, now: DateTime<Utc>) -> Vec<FileRecord> {
        let mut records = self.records.write().await;
        let expired: Vec<String> = records
            .values()
            .filter(|r| r.expiry_time < now)
            .map(|r| r.id.clone())
            .collect();

        if expired.is_empty() {
            return Vec::new();
        }

        let removed: Vec<FileRecord> = expired
            .iter()
            .filter_map(|id| records.remove(id))
            .collect();
        self.persist_logged(&records).await;
        removed
    }

    /// Write the current state to disk.
    pub async fn snapshot(&self) -> Result<(), StoreError> {
        let records = self.records.write().await;
        self.persist(&records).await
    }

    async fn persist_logged(&self, records: &Records) {
        if let Err(e) = self.persist(records).await {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "Failed to persist metadata snapshot"
            );
        }
    }

    /// Serialize to a sibling temp file, then rename over the snapshot so a
    /// crash mid-write never leaves a truncated document behind.
    async fn persist(&self, records: &Records) -> Result<(), StoreError> {
        let data = serde_json::to_vec(records)?;
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, self.path.as_path()).await?;
        Ok(())
    }
}
