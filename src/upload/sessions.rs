use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{allowed_extension, UploadError};
use crate::object_store::LocalStore;

/// A chunk written to the chunk directory.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub key: String,
    pub byte_size: u64,
}

/// One in-flight upload, keyed by an opaque token handed to the client.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub token: Uuid,
    pub file_name: String,
    pub extension: String,
    pub total_chunks: u32,
    /// Ordered by index so reassembly can walk it directly.
    pub chunks: BTreeMap<u32, StoredChunk>,
    pub byte_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    fn new(file_name: &str, extension: String, total_chunks: u32) -> Self {
        let now = Utc::now();
        Self {
            token: Uuid::new_v4(),
            file_name: file_name.to_string(),
            extension,
            total_chunks,
            chunks: BTreeMap::new(),
            byte_size: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn received(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_complete(&self, total_chunks: u32) -> bool {
        self.chunks.len() == total_chunks as usize
    }

    /// True when exactly the indices `0..total_chunks` are present.
    pub fn is_contiguous(&self, total_chunks: u32) -> bool {
        self.is_complete(total_chunks) && self.chunks.keys().copied().eq(0..total_chunks)
    }

    fn size_with(&self, index: u32, len: u64) -> u64 {
        let replaced = self.chunks.get(&index).map_or(0, |c| c.byte_size);
        self.byte_size - replaced + len
    }
}

/// What the client gets back for a stored chunk.
#[derive(Debug, Clone)]
pub struct ChunkReceipt {
    pub session: Uuid,
    pub chunk_key: String,
    pub index: u32,
    pub received: usize,
    pub total_chunks: u32,
}

impl ChunkReceipt {
    pub fn is_complete(&self) -> bool {
        self.received == self.total_chunks as usize
    }
}

/// Tracks in-flight chunked uploads.
#[derive(Clone)]
pub struct ChunkSessionTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    sessions: Mutex<HashMap<Uuid, UploadSession>>,
    chunks: LocalStore,
    max_file_size: u64,
}

impl ChunkSessionTracker {
    pub fn new(chunks: LocalStore, max_file_size: u64) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                sessions: Mutex::new(HashMap::new()),
                chunks,
                max_file_size,
            }),
        }
    }

    pub fn chunk_store(&self) -> &LocalStore {
        &self.inner.chunks
    }

    /// Store one chunk.
    ///
    /// The extension is checked before anything else, so a rejected file
    /// never creates session state. `index` must be below the session's
    /// declared chunk count. Without a `session` token a new session
    /// is opened; with one, the token must name a tracked session. Chunks
    /// may arrive in any order and a repeated index replaces the earlier
    /// chunk.
    pub async fn put_chunk(
        &self,
        session: Option<Uuid>,
        file_name: &str,
        index: u32,
        total_chunks: u32,
        data: Bytes,
    ) -> Result<ChunkReceipt, UploadError> {
        let extension = allowed_extension(file_name)?;
        if index >= total_chunks {
            return Err(UploadError::ChunkOutOfRange {
                index,
                total_chunks,
            });
        }
        let len = data.len() as u64;
        let limit = self.inner.max_file_size;

        let token = {
            let mut sessions = self.inner.sessions.lock().await;
            match session {
                Some(token) => {
                    let existing = sessions
                        .get(&token)
                        .ok_or_else(|| UploadError::SessionNotFound(token.to_string()))?;
                    if existing.extension != extension {
                        return Err(UploadError::InvalidFileType(file_name.to_string()));
                    }
                    // The session keeps the count it was opened with.
                    if index >= existing.total_chunks {
                        return Err(UploadError::ChunkOutOfRange {
                            index,
                            total_chunks: existing.total_chunks,
                        });
                    }
                    if existing.size_with(index, len) > limit {
                        return Err(UploadError::FileTooLarge { limit });
                    }
                    token
                }
                None => {
                    if len > limit {
                        return Err(UploadError::FileTooLarge { limit });
                    }
                    let created = UploadSession::new(file_name, extension.clone(), total_chunks);
                    let token = created.token;
                    sessions.insert(token, created);
                    tracing::info!(
                        session_id = %token,
                        file_name,
                        total_chunks,
                        "Opened upload session"
                    );
                    token
                }
            }
        };

        // The write happens outside the lock so other sessions keep moving.
        let chunk_key = format!("{token}_{index}{extension}");
        self.inner
            .chunks
            .put(&chunk_key, data)
            .await
            .map_err(|e| UploadError::ChunkWriteFailed(e.to_string()))?;

        let mut sessions = self.inner.sessions.lock().await;
        let Some(tracked) = sessions.get_mut(&token) else {
            // Completed or expired while the chunk was being written.
            drop(sessions);
            let _ = self.inner.chunks.delete(&chunk_key).await;
            return Err(UploadError::SessionNotFound(token.to_string()));
        };

        let new_size = tracked.size_with(index, len);
        if new_size > limit {
            tracked.chunks.remove(&index);
            tracked.byte_size = tracked.chunks.values().map(|c| c.byte_size).sum();
            drop(sessions);
            let _ = self.inner.chunks.delete(&chunk_key).await;
            return Err(UploadError::FileTooLarge { limit });
        }

        tracked.byte_size = new_size;
        tracked.chunks.insert(
            index,
            StoredChunk {
                key: chunk_key.clone(),
                byte_size: len,
            },
        );
        tracked.updated_at = Utc::now();

        tracing::debug!(
            session_id = %token,
            chunk_index = index,
            received = tracked.received(),
            total_chunks = tracked.total_chunks,
            "Stored chunk"
        );

        Ok(ChunkReceipt {
            session: token,
            chunk_key,
            index,
            received: tracked.received(),
            total_chunks: tracked.total_chunks,
        })
    }

    pub async fn get(&self, token: Uuid) -> Option<UploadSession> {
        self.inner.sessions.lock().await.get(&token).cloned()
    }

    pub async fn is_complete(&self, token: Uuid, total_chunks: u32) -> bool {
        self.inner
            .sessions
            .lock()
            .await
            .get(&token)
            .is_some_and(|s| s.is_complete(total_chunks))
    }

    /// Remove a session regardless of its state.
    pub async fn take_session(&self, token: Uuid) -> Result<UploadSession, UploadError> {
        self.inner
            .sessions
            .lock()
            .await
            .remove(&token)
            .ok_or_else(|| UploadError::SessionNotFound(token.to_string()))
    }

    /// Remove and return a session whose chunks are exactly
    /// `0..total_chunks`. An incomplete session stays tracked.
    pub async fn take_complete(
        &self,
        token: Uuid,
        total_chunks: u32,
    ) -> Result<UploadSession, UploadError> {
        let mut sessions = self.inner.sessions.lock().await;
        let session = sessions
            .get(&token)
            .ok_or_else(|| UploadError::SessionNotFound(token.to_string()))?;

        if total_chunks == 0 || !session.is_contiguous(total_chunks) {
            return Err(UploadError::MissingChunks {
                expected: total_chunks,
                received: session.received(),
            });
        }

        sessions
            .remove(&token)
            .ok_or_else(|| UploadError::SessionNotFound(token.to_string()))
    }

    /// Drop sessions that have not received a chunk for `ttl`, returning
    /// them so their chunk files can be removed.
    pub async fn expire_idle(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<UploadSession> {
        let mut sessions = self.inner.sessions.lock().await;
        let idle: Vec<Uuid> = sessions
            .values()
            .filter(|s| s.updated_at + ttl < now)
            .map(|s| s.token)
            .collect();

        idle.iter().filter_map(|t| sessions.remove(t)).collect()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.lock().await.len()
    }
}
