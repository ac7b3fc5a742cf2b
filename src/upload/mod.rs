//! Upload lifecycle: chunk sessions, identifier allocation and reassembly.

mod assembler;
mod id;
mod sessions;

pub use assembler::Assembler;
pub use id::{Candidates, IdAllocator, Reservation};
pub use sessions::{ChunkReceipt, ChunkSessionTracker, StoredChunk, UploadSession};

use std::path::Path;
use thiserror::Error;

/// Extensions accepted at the chunk boundary, matched on the file name only.
pub const ALLOWED_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".mp4", ".webm", ".pdf"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("File type not allowed: {0}")]
    InvalidFileType(String),
    #[error("Upload session not found: {0}")]
    SessionNotFound(String),
    #[error("Missing chunks: expected {expected}, received {received}")]
    MissingChunks { expected: u32, received: usize },
    #[error("Chunk index {index} is outside 0..{total_chunks}")]
    ChunkOutOfRange { index: u32, total_chunks: u32 },
    #[error("Upload exceeds the maximum size of {limit} bytes")]
    FileTooLarge { limit: u64 },
    #[error("Failed to save chunk: {0}")]
    ChunkWriteFailed(String),
    #[error("Failed to combine chunks: {0}")]
    AssemblyFailed(String),
    #[error("No free identifier after {attempts} attempts")]
    IdentifierExhausted { attempts: usize },
}

/// Return the lowercased extension of `file_name` (with its leading dot)
/// if it is on the whitelist.
pub fn allowed_extension(file_name: &str) -> Result<String, UploadError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .ok_or_else(|| UploadError::InvalidFileType(file_name.to_string()))?;

    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(UploadError::InvalidFileType(file_name.to_string()))
    }
}
