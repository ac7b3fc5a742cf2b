//! Read-side lookup of shared files.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::object_store::LocalStore;
use crate::storage::{FileRecord, MetadataStore};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("File not found")]
    NotFound,
    #[error("File has expired")]
    Expired,
}

/// How a resolved file should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    Raw,
    Preview,
}

/// Strip an optional extension from a path segment (`abc123.png` -> `abc123`).
pub fn base_id(segment: &str) -> &str {
    segment.split('.').next().unwrap_or(segment)
}

/// Look up a live record. Expiry is checked at read time only; an expired
/// record stays on disk until the reaper's next cycle.
pub async fn resolve(
    store: &MetadataStore,
    objects: &LocalStore,
    id: &str,
    now: DateTime<Utc>,
) -> Result<FileRecord, RetrievalError> {
    let record = store.get(id).await.ok_or(RetrievalError::NotFound)?;

    if record.is_expired_at(now) {
        return Err(RetrievalError::Expired);
    }

    match objects.exists(&record.object_key()).await {
        Ok(true) => Ok(record),
        Ok(false) => {
            tracing::warn!(file_id = %id, "Record has no backing object");
            Err(RetrievalError::NotFound)
        }
        Err(e) => {
            tracing::warn!(file_id = %id, error = %e, "Failed to stat backing object");
            Err(RetrievalError::NotFound)
        }
    }
}

/// Raw bytes go to explicit `raw=true` requests and to clients that only
/// accept image or video content (embedders, `<img>`/`<video>` tags);
/// everyone else gets the preview page.
pub fn presentation(raw: bool, accept: Option<&str>) -> Presentation {
    let media_accept = accept
        .map(|a| a.starts_with("image/") || a.starts_with("video/"))
        .unwrap_or(false);
    if raw || media_accept {
        Presentation::Raw
    } else {
        Presentation::Preview
    }
}
