use axum::extract::{Multipart, State};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::upload::{allowed_extension, UploadError};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub session_id: Uuid,
    pub chunk_id: String,
    pub chunk_index: u32,
    pub received: usize,
    pub total_chunks: u32,
    pub complete: bool,
    pub success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    pub session_id: Uuid,
    pub total_chunks: u32,
    /// Accepted for older clients; the session already knows the name.
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadResponse {
    pub file_id: String,
    pub share_link: String,
    pub expires_at: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Multipart fields: `chunk` (bytes), `fileName`, `chunkIndex`,
/// `totalChunks` and, after the first call, `sessionId`.
pub async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<JSend<ChunkResponse>>, ApiError> {
    let mut chunk: Option<Bytes> = None;
    let mut file_name: Option<String> = None;
    let mut chunk_index: Option<u32> = None;
    let mut total_chunks: Option<u32> = None;
    let mut session_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "chunk" => {
                chunk = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Failed to read chunk: {e}")))?,
                );
            }
            "fileName" => file_name = Some(text(field, "fileName").await?),
            "chunkIndex" => chunk_index = Some(number(field, "chunkIndex").await?),
            "totalChunks" => total_chunks = Some(number(field, "totalChunks").await?),
            "sessionId" => session_id = Some(text(field, "sessionId").await?),
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let chunk = chunk.ok_or_else(|| ApiError::bad_request("chunk field is required"))?;
    let file_name =
        file_name.ok_or_else(|| ApiError::bad_request("fileName field is required"))?;
    let chunk_index =
        chunk_index.ok_or_else(|| ApiError::bad_request("chunkIndex field is required"))?;
    let total_chunks =
        total_chunks.ok_or_else(|| ApiError::bad_request("totalChunks field is required"))?;

    // Extension first, as in put_chunk.
    allowed_extension(&file_name)?;
    let session_id = match session_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            Uuid::parse_str(raw)
                .map_err(|_| UploadError::SessionNotFound(raw.to_string()))?,
        ),
    };

    let receipt = state
        .sessions
        .put_chunk(session_id, &file_name, chunk_index, total_chunks, chunk)
        .await?;

    Ok(JSend::success(ChunkResponse {
        session_id: receipt.session,
        complete: receipt.is_complete(),
        chunk_id: receipt.chunk_key,
        chunk_index: receipt.index,
        received: receipt.received,
        total_chunks: receipt.total_chunks,
        success: true,
    }))
}

pub async fn complete_upload(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CompleteUploadRequest>,
) -> Result<Json<JSend<CompleteUploadResponse>>, ApiError> {
    let record = state
        .assembler
        .complete(req.session_id, req.total_chunks)
        .await?;

    Ok(JSend::success(CompleteUploadResponse {
        share_link: record.share_link(),
        expires_at: record.expiry_time.to_rfc3339(),
        file_id: record.id,
    }))
}

// ============================================================================
// Helpers
// ============================================================================

async fn text(field: axum::extract::multipart::Field<'_>, name: &str) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid {name}: {e}")))
}

async fn number(field: axum::extract::multipart::Field<'_>, name: &str) -> Result<u32, ApiError> {
    text(field, name)
        .await?
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("{name} must be a non-negative integer")))
}
