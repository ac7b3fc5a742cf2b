use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::api::preview;
use crate::api::response::{ApiError, AppQuery};
use crate::object_store::ObjectStoreError;
use crate::retrieval::{self, Presentation};
use crate::storage::FileRecord;
use crate::AppState;

/// Upper bound for client caching; never past the file's expiry.
const MAX_CACHE_SECONDS: i64 = 3600;

#[derive(Debug, Default, Deserialize)]
pub struct FileParams {
    #[serde(default)]
    pub raw: bool,
    #[serde(default)]
    pub download: bool,
}

/// Route: GET /files/:id where `id` may carry the file's extension.
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(segment): Path<String>,
    AppQuery(params): AppQuery<FileParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id = retrieval::base_id(&segment);
    let record = retrieval::resolve(&state.store, &state.objects, id, Utc::now()).await?;

    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    match retrieval::presentation(params.raw, accept) {
        Presentation::Raw => raw_response(&state, &record, params.download).await,
        Presentation::Preview => {
            Ok(Html(preview::render(&record, &state.config.server.site_url)).into_response())
        }
    }
}

/// Route: GET /static/file-preview.svg
pub async fn placeholder_image() -> Response {
    (
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ],
        preview::PLACEHOLDER_SVG,
    )
        .into_response()
}

async fn raw_response(
    state: &AppState,
    record: &FileRecord,
    download: bool,
) -> Result<Response, ApiError> {
    let file = state
        .objects
        .open(&record.object_key())
        .await
        .map_err(|e| match e {
            ObjectStoreError::NotFound(_) => ApiError::not_found("File not found"),
            _ => ApiError::internal(format!("Failed to read file: {e}")),
        })?;
    let byte_size = file
        .metadata()
        .await
        .map(|m| m.len())
        .unwrap_or(record.byte_size);

    let mut response = (StatusCode::OK, Body::from_stream(ReaderStream::new(file))).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        record
            .mime_type
            .parse()
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(byte_size));

    let disposition = if download { "attachment" } else { "inline" };
    let filename = record.original_name.replace(['"', '\\'], "_");
    if let Ok(value) = format!("{disposition}; filename=\"{filename}\"").parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    let remaining = (record.expiry_time - Utc::now()).num_seconds();
    let max_age = remaining.clamp(0, MAX_CACHE_SECONDS);
    if let Ok(value) = format!("public, max-age={max_age}").parse() {
        headers.insert(header::CACHE_CONTROL, value);
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::{Duration, Utc};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::api::create_router;
    use crate::storage::FileRecord;
    use crate::testutil::{chunk_request, complete_request, test_state};

    async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, bytes::Bytes) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body)
    }

    fn json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[tokio::test]
    async fn test_out_of_order_upload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = create_router(state.clone());

        let chunks = [pattern(1024, 1), pattern(2048, 2), pattern(512, 3)];

        let (status, body) = send(&router, chunk_request(None, "a.png", 1, 3, &chunks[1])).await;
        assert_eq!(status, StatusCode::OK);
        let session = json(&body)["data"]["sessionId"].as_str().unwrap().to_string();

        for index in [0usize, 2] {
            let (status, body) = send(
                &router,
                chunk_request(Some(&session), "a.png", index as u32, 3, &chunks[index]),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json(&body)["data"]["success"], Value::Bool(true));
        }

        let (status, body) = send(&router, complete_request(&session, 3)).await;
        assert_eq!(status, StatusCode::OK);
        let data = &json(&body)["data"];
        let file_id = data["fileId"].as_str().unwrap().to_string();
        assert_eq!(file_id.len(), 6);
        assert_eq!(data["shareLink"], format!("/files/{file_id}.png"));

        let request = Request::get(format!("/files/{file_id}.png?raw=true"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.len(), 3584);
        assert_eq!(body.to_vec(), chunks.concat());
    }

    #[tokio::test]
    async fn test_complete_with_missing_chunk_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = create_router(state);

        let (_, body) = send(&router, chunk_request(None, "doc.pdf", 0, 3, b"first")).await;
        let session = json(&body)["data"]["sessionId"].as_str().unwrap().to_string();
        send(&router, chunk_request(Some(&session), "doc.pdf", 1, 3, b"second")).await;

        let (status, body) = send(&router, complete_request(&session, 3)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["status"], "fail");
    }

    #[tokio::test]
    async fn test_disallowed_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = create_router(state.clone());

        let (status, _) = send(&router, chunk_request(None, "run.exe", 0, 1, b"MZ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.sessions.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_placeholder_image_is_served() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = create_router(state);

        let response = router
            .oneshot(
                Request::get("/static/file-preview.svg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/svg+xml");
    }

    #[tokio::test]
    async fn test_file_type_is_judged_before_session_token() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = create_router(state);

        let (status, body) =
            send(&router, chunk_request(Some("not-a-token"), "run.exe", 0, 1, b"MZ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["data"]["message"], "File type not allowed");

        let (status, body) =
            send(&router, chunk_request(Some("not-a-token"), "a.png", 0, 1, b"x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["data"]["message"], "Upload session not found");
    }

    #[tokio::test]
    async fn test_unknown_session_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = create_router(state);

        let stranger = uuid::Uuid::new_v4().to_string();
        let (status, _) = send(&router, chunk_request(Some(&stranger), "a.png", 1, 2, b"x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&router, complete_request(&stranger, 2)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_unknown_and_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = create_router(state.clone());

        let (status, _) = send(
            &router,
            Request::get("/files/nope42.png").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let record = FileRecord::new(
            "Old123".to_string(),
            "old.gif".to_string(),
            "image/gif".to_string(),
            3,
            ".gif".to_string(),
            Utc::now() - Duration::hours(25),
        );
        state
            .objects
            .put(&record.object_key(), bytes::Bytes::from_static(b"GIF"))
            .await
            .unwrap();
        state.store.insert(record).await;

        let (status, body) = send(
            &router,
            Request::get("/files/Old123.gif?raw=true")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(json(&body)["status"], "fail");
    }

    #[tokio::test]
    async fn test_preview_versus_raw_negotiation() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let router = create_router(state.clone());

        let record = FileRecord::new(
            "Pic999".to_string(),
            "<cat>.png".to_string(),
            "image/png".to_string(),
            4,
            ".png".to_string(),
            Utc::now(),
        );
        state
            .objects
            .put(&record.object_key(), bytes::Bytes::from_static(b"\x89PNG"))
            .await
            .unwrap();
        state.store.insert(record).await;

        let request = Request::get("/files/Pic999.png")
            .header(header::ACCEPT, "text/html")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        let html = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(html.to_vec()).unwrap();
        assert!(html.contains("og:title"));
        assert!(html.contains("&lt;cat&gt;.png"));
        assert!(!html.contains("<cat>"));

        let request = Request::get("/files/Pic999")
            .header(header::ACCEPT, "image/avif,image/webp,*/*")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    }
}
