//! ephemeral-host - Short-lived file hosting with chunked uploads
//!
//! Clients upload a file in chunks, the service reassembles it under a short
//! public identifier, serves it raw or behind a preview page for 24 hours,
//! and a background reaper reclaims storage afterwards.
//! - Token-keyed chunk sessions with out-of-order arrival
//! - Bounded, reservation-based short identifier allocation
//! - JSON snapshot metadata store, written through on every mutation
//! - Cancellable reaper that persists a final snapshot on shutdown

pub mod api;
pub mod config;
pub mod object_store;
pub mod reaper;
pub mod retrieval;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod upload;

use std::path::Path;

use config::Config;
use object_store::LocalStore;
use reaper::Reaper;
use storage::MetadataStore;
use upload::{Assembler, ChunkSessionTracker, IdAllocator};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub store: MetadataStore,
    pub objects: LocalStore,
    pub sessions: ChunkSessionTracker,
    pub assembler: Assembler,
}

impl AppState {
    /// Create the storage directories, restore the metadata snapshot and
    /// wire the upload components together.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let objects = LocalStore::new(&config.storage.upload_dir)?;
        let chunks = LocalStore::new(&config.storage.chunk_dir)?;

        if let Some(parent) = Path::new(&config.storage.metadata_file).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let store = MetadataStore::restore(&config.storage.metadata_file).await;

        let sessions = ChunkSessionTracker::new(chunks, config.max_file_size);
        let assembler = Assembler::new(
            IdAllocator::default(),
            objects.clone(),
            sessions.clone(),
            store.clone(),
        );

        Ok(Self {
            config,
            store,
            objects,
            sessions,
            assembler,
        })
    }

    pub fn reaper(&self) -> Reaper {
        Reaper::new(
            self.store.clone(),
            self.objects.clone(),
            self.sessions.clone(),
            self.config.reaper.interval(),
            self.config.reaper.session_ttl(),
        )
    }
}
