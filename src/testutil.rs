//! Shared test helpers for ephemeral-host handler tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request};

use crate::config::{Config, ReaperConfig, ServerConfig, StorageConfig};
use crate::AppState;

const BOUNDARY: &str = "ephemeral-host-test-boundary";

/// Create a test AppState whose directories all live in `temp_dir`.
pub async fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let root = temp_dir.path();

    let config = Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            site_url: "http://localhost:8000".to_string(),
        },
        storage: StorageConfig {
            upload_dir: root.join("uploads").to_string_lossy().to_string(),
            chunk_dir: root.join("chunks").to_string_lossy().to_string(),
            metadata_file: root.join("metadata.json").to_string_lossy().to_string(),
        },
        reaper: ReaperConfig::default(),
        max_file_size: 10 * 1024 * 1024, // 10MB for tests
        max_chunk_size: 1024 * 1024,
    };

    Arc::new(
        AppState::new(config)
            .await
            .expect("Failed to create test state"),
    )
}

/// Build a multipart `POST /upload/chunk` request.
pub fn chunk_request(
    session: Option<&str>,
    file_name: &str,
    index: u32,
    total: u32,
    data: &[u8],
) -> Request<Body> {
    let mut body = Vec::new();
    let mut text_field = |name: &str, value: &str| {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    };

    text_field("fileName", file_name);
    text_field("chunkIndex", &index.to_string());
    text_field("totalChunks", &total.to_string());
    if let Some(session) = session {
        text_field("sessionId", session);
    }

    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"chunk\"; filename=\"blob\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/upload/chunk")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("valid request")
}

/// Build a `POST /upload/complete` request.
pub fn complete_request(session: &str, total: u32) -> Request<Body> {
    let payload = serde_json::json!({
        "sessionId": session,
        "totalChunks": total,
    });

    Request::post("/upload/complete")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("valid request")
}
