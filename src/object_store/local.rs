use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::{File, OpenOptions};

use super::ObjectStoreError;

/// Directory-backed file store. Keys are plain file names directly under
/// `base_path`; the same type backs both the object root and the chunk
/// directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    base_path: PathBuf,
}

/// A file found while listing a store.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub key: String,
    pub byte_size: u64,
    pub modified: SystemTime,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn object_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    /// Write `data` under `key`, replacing whatever was there.
    pub async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key);
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    /// Atomically claim `key` by creating an empty file with create-new
    /// semantics. Returns `None` if the key is already taken.
    pub async fn reserve(&self, key: &str) -> Result<Option<File>, ObjectStoreError> {
        let path = self.object_path(key);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn open(&self, key: &str) -> Result<File, ObjectStoreError> {
        let path = self.object_path(key);
        match File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let path = self.object_path(key);
        Ok(tokio::fs::try_exists(&path).await?)
    }

    /// Remove `key`. A key that is already gone is not an error; the return
    /// value tells whether anything was removed.
    pub async fn delete(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let path = self.object_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List every regular file in the store.
    pub async fn list(&self) -> Result<Vec<StoredEntry>, ObjectStoreError> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.base_path).await?;

        while let Some(entry) = dir.next_entry().await? {
            // Entries can vanish between read_dir and stat (concurrent deletes).
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                continue;
            }
            let Some(key) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            entries.push(StoredEntry {
                key,
                byte_size: metadata.len(),
                modified: metadata.modified()?,
            });
        }

        Ok(entries)
    }
}
