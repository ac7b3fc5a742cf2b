use chrono::Utc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use super::{ChunkSessionTracker, IdAllocator, UploadError, UploadSession};
use crate::object_store::{LocalStore, ObjectStoreError};
use crate::storage::{FileRecord, MetadataStore};

/// Bytes read from the head of an object for content sniffing.
const SNIFF_LEN: u64 = 8192;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Turns a finished chunk session into a stored object and its record.
#[derive(Clone)]
pub struct Assembler {
    allocator: IdAllocator,
    objects: LocalStore,
    sessions: ChunkSessionTracker,
    store: MetadataStore,
}

impl Assembler {
    pub fn new(
        allocator: IdAllocator,
        objects: LocalStore,
        sessions: ChunkSessionTracker,
        store: MetadataStore,
    ) -> Self {
        Self {
            allocator,
            objects,
            sessions,
            store,
        }
    }

    /// Concatenate the session's chunks in index order into a freshly
    /// allocated object, then insert and persist its record.
    ///
    /// A failure while concatenating is fatal for the session: the partial
    /// object is removed and any chunks not yet consumed are left for the
    /// reaper.
    pub async fn complete(&self, token: Uuid, total_chunks: u32) -> Result<FileRecord, UploadError> {
        let session = self.sessions.take_complete(token, total_chunks).await?;
        let reservation = self
            .allocator
            .reserve(&self.objects, &self.store, &session.extension)
            .await?;

        let byte_size = match self.concatenate(reservation.file, &session).await {
            Ok(size) => size,
            Err(e) => {
                tracing::error!(
                    session_id = %token,
                    file_id = %reservation.id,
                    error = %e,
                    "Assembly failed"
                );
                if let Err(e) = self.objects.delete(&reservation.key).await {
                    tracing::warn!(key = %reservation.key, error = %e, "Failed to remove partial object");
                }
                return Err(UploadError::AssemblyFailed(e.to_string()));
            }
        };

        let mime_type = self.sniff(&reservation.key, &session.file_name).await;
        let record = FileRecord::new(
            reservation.id,
            session.file_name,
            mime_type,
            byte_size,
            session.extension,
            Utc::now(),
        );
        self.store.insert(record.clone()).await;

        tracing::info!(
            session_id = %token,
            file_id = %record.id,
            bytes = record.byte_size,
            mime_type = %record.mime_type,
            "Upload complete"
        );

        Ok(record)
    }

    async fn concatenate(&self, mut out: File, session: &UploadSession) -> Result<u64, ObjectStoreError> {
        let chunks = self.sessions.chunk_store();
        for chunk in session.chunks.values() {
            let mut input = chunks.open(&chunk.key).await?;
            tokio::io::copy(&mut input, &mut out).await?;
            drop(input);
            chunks.delete(&chunk.key).await?;
        }

        out.flush().await?;
        out.sync_all().await?;
        Ok(out.metadata().await?.len())
    }

    /// Detect the MIME type from the object's leading bytes, falling back to
    /// the declared file name and finally to `application/octet-stream`.
    async fn sniff(&self, key: &str, file_name: &str) -> String {
        let mut head = Vec::with_capacity(SNIFF_LEN as usize);
        match self.objects.open(key).await {
            Ok(file) => {
                if let Err(e) = file.take(SNIFF_LEN).read_to_end(&mut head).await {
                    tracing::warn!(key, error = %e, "Failed to read object head for sniffing");
                }
            }
            Err(e) => tracing::warn!(key, error = %e, "Failed to open object for sniffing"),
        }

        infer::get(&head)
            .map(|kind| kind.mime_type().to_string())
            .or_else(|| mime_guess::from_path(file_name).first().map(|m| m.to_string()))
            .unwrap_or_else(|| FALLBACK_MIME.to_string())
    }
}
