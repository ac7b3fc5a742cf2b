//! Background retention enforcement.
//!
//! One long-lived task alternates between sweeping and sleeping. A failed
//! phase is logged and the remaining phases still run; only cancellation
//! ends the loop, after which a final metadata snapshot is written.

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration as StdDuration, SystemTime};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::object_store::{LocalStore, ObjectStoreError};
use crate::retrieval::base_id;
use crate::storage::models::retention;
use crate::storage::MetadataStore;
use crate::upload::ChunkSessionTracker;

/// Chunk files older than this are deleted whether or not their session is
/// still tracked.
pub const ORPHAN_CHUNK_AGE: StdDuration = StdDuration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ReaperError {
    #[error("Reaper cycle failed during {phase}: {source}")]
    CycleFailed {
        phase: &'static str,
        #[source]
        source: ObjectStoreError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaperState {
    Sweeping,
    Idle,
}

/// Counts from one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepStats {
    pub expired_records: usize,
    pub deleted_objects: usize,
    pub missing_objects: usize,
    pub dangling_objects: usize,
    pub idle_sessions: usize,
    pub orphan_chunks: usize,
    /// Phases that could not list their directory this cycle.
    pub failed_phases: usize,
}

#[derive(Clone)]
pub struct Reaper {
    store: MetadataStore,
    objects: LocalStore,
    sessions: ChunkSessionTracker,
    interval: StdDuration,
    session_ttl: Duration,
}

impl Reaper {
    pub fn new(
        store: MetadataStore,
        objects: LocalStore,
        sessions: ChunkSessionTracker,
        interval: StdDuration,
        session_ttl: Duration,
    ) -> Self {
        Self {
            store,
            objects,
            sessions,
            interval,
            session_ttl,
        }
    }

    /// Run one cycle against the wall clock.
    pub async fn sweep(&self) -> SweepStats {
        self.sweep_at(Utc::now(), SystemTime::now()).await
    }

    /// Run one cycle as of `now`. `fs_now` is the filesystem clock used for
    /// modification-time comparisons.
    ///
    /// Each phase runs regardless of how the previous one went; a phase
    /// that fails is logged and counted in [`SweepStats::failed_phases`].
    pub async fn sweep_at(&self, now: DateTime<Utc>, fs_now: SystemTime) -> SweepStats {
        let mut stats = SweepStats::default();

        // Records go first (one snapshot for the batch), then their objects,
        // so a reader never finds a record whose object was already removed.
        let expired = self.store.remove_expired(now).await;
        stats.expired_records = expired.len();
        for record in &expired {
            match self.objects.delete(&record.object_key()).await {
                Ok(true) => stats.deleted_objects += 1,
                Ok(false) => {
                    stats.missing_objects += 1;
                    tracing::warn!(file_id = %record.id, "Expired record had no backing object");
                }
                Err(e) => {
                    tracing::error!(file_id = %record.id, error = %e, "Failed to delete expired object");
                }
            }
        }

        match self.sweep_dangling_objects(fs_now).await {
            Ok(removed) => stats.dangling_objects = removed,
            Err(e) => {
                stats.failed_phases += 1;
                tracing::error!(error = %e, "Reaper phase failed");
            }
        }

        let idle = self.sessions.expire_idle(now, self.session_ttl).await;
        stats.idle_sessions = idle.len();
        let chunks = self.sessions.chunk_store();
        for session in &idle {
            tracing::info!(
                session_id = %session.token,
                file_name = %session.file_name,
                received = session.received(),
                "Dropped abandoned upload session"
            );
            for chunk in session.chunks.values() {
                if let Err(e) = chunks.delete(&chunk.key).await {
                    tracing::warn!(key = %chunk.key, error = %e, "Failed to delete abandoned chunk");
                }
            }
        }

        match self.sweep_orphan_chunks(fs_now).await {
            Ok(removed) => stats.orphan_chunks = removed,
            Err(e) => {
                stats.failed_phases += 1;
                tracing::error!(error = %e, "Reaper phase failed");
            }
        }

        stats
    }

    /// Objects with no live record that are older than the retention
    /// window. Younger ones may belong to an assembly in progress.
    async fn sweep_dangling_objects(&self, fs_now: SystemTime) -> Result<usize, ReaperError> {
        let entries = self
            .objects
            .list()
            .await
            .map_err(|source| ReaperError::CycleFailed {
                phase: "dangling object sweep",
                source,
            })?;
        let live: HashSet<String> = self.store.all().await.into_iter().map(|r| r.id).collect();
        let protected = self.snapshot_keys(&self.objects).await;
        let max_age = retention().to_std().unwrap_or(ORPHAN_CHUNK_AGE);

        let mut removed = 0;
        for entry in entries {
            if protected.contains(&entry.key)
                || live.contains(base_id(&entry.key))
                || !is_older(entry.modified, fs_now, max_age)
            {
                continue;
            }
            tracing::warn!(key = %entry.key, "Deleting object without a live record");
            match self.objects.delete(&entry.key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(key = %entry.key, error = %e, "Failed to delete dangling object"),
            }
        }
        Ok(removed)
    }

    async fn sweep_orphan_chunks(&self, fs_now: SystemTime) -> Result<usize, ReaperError> {
        let chunks = self.sessions.chunk_store();
        let entries = chunks
            .list()
            .await
            .map_err(|source| ReaperError::CycleFailed {
                phase: "orphan chunk sweep",
                source,
            })?;
        let protected = self.snapshot_keys(chunks).await;

        let mut removed = 0;
        for entry in entries {
            if protected.contains(&entry.key) || !is_older(entry.modified, fs_now, ORPHAN_CHUNK_AGE) {
                continue;
            }
            match chunks.delete(&entry.key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(key = %entry.key, error = %e, "Failed to delete orphan chunk"),
            }
        }
        Ok(removed)
    }

    /// Keys of the metadata snapshot and its temp file when the snapshot
    /// lives directly inside `dir`.
    async fn snapshot_keys(&self, dir: &LocalStore) -> HashSet<String> {
        let snapshot = self.store.path();
        let (Some(parent), Some(name)) = (snapshot.parent(), snapshot.file_name()) else {
            return HashSet::new();
        };
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };

        let same_dir = match (
            tokio::fs::canonicalize(parent).await,
            tokio::fs::canonicalize(dir.base_path()).await,
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => parent == dir.base_path(),
        };
        if !same_dir {
            return HashSet::new();
        }

        let name = name.to_string_lossy();
        HashSet::from([name.to_string(), format!("{name}.tmp")])
    }

    /// Start the background loop.
    pub fn spawn(self) -> ReaperHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        ReaperHandle { cancel, task }
    }

    async fn run(self, cancel: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Reaper started");

        loop {
            tracing::debug!(state = ?ReaperState::Sweeping, "Reaper cycle starting");
            let stats = self.sweep().await;
            tracing::info!(
                expired_records = stats.expired_records,
                deleted_objects = stats.deleted_objects,
                missing_objects = stats.missing_objects,
                dangling_objects = stats.dangling_objects,
                idle_sessions = stats.idle_sessions,
                orphan_chunks = stats.orphan_chunks,
                failed_phases = stats.failed_phases,
                "Reaper cycle complete"
            );

            tracing::debug!(state = ?ReaperState::Idle, "Reaper sleeping");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        if let Err(e) = self.store.snapshot().await {
            tracing::error!(error = %e, "Failed to persist metadata during shutdown");
        }
        tracing::info!("Reaper stopped");
    }
}

fn is_older(modified: SystemTime, now: SystemTime, age: StdDuration) -> bool {
    now.duration_since(modified)
        .map(|elapsed| elapsed > age)
        .unwrap_or(false)
}

/// Handle to the running reaper task.
pub struct ReaperHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal the loop to stop and wait for it, including its final
    /// snapshot.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Reaper task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
