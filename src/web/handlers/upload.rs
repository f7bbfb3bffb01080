//! Upload handlers: chunk transport, assembly and URL intake.

use axum::{
    extract::{Multipart, State},
    Json,
};
use std::sync::Arc;

use crate::file::{CompleteUpload, UrlIngest};
use crate::web::dto::{
    ChunkUploadResponse, CompleteUploadRequest, FileEnvelope, UrlUploadRequest, ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::AuthUser;

/// POST /api/upload/chunk - Stage one chunk of an upload.
///
/// Request body: multipart/form-data with `chunk` (bytes), `uploadId` and
/// `chunkIndex` fields.
#[utoipa::path(
    post,
    path = "/api/upload/chunk",
    tag = "upload",
    request_body(content = String, content_type = "multipart/form-data", description = "Fields: chunk, uploadId, chunkIndex"),
    responses(
        (status = 200, description = "Chunk staged", body = ChunkUploadResponse),
        (status = 400, description = "Missing field, empty or oversized chunk"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Upload id belongs to another user"),
        (status = 500, description = "Chunk could not be written")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ChunkUploadResponse>, ApiError> {
    let mut upload_id: Option<String> = None;
    let mut chunk_index: Option<u32> = None;
    let mut chunk: Option<axum::body::Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::debug!("Failed to read multipart field: {}", e);
        ApiError::bad_request(format!("Invalid multipart data: {}", e.body_text()))
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "chunk" => {
                chunk = Some(field.bytes().await.map_err(|e| {
                    tracing::debug!("Failed to read chunk body: {}", e);
                    ApiError::bad_request(format!("Failed to read chunk: {}", e.body_text()))
                })?);
            }
            "uploadId" => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| ApiError::bad_request("Invalid uploadId"))?;
                upload_id = Some(text.trim().to_string());
            }
            "chunkIndex" => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| ApiError::bad_request("Invalid chunkIndex"))?;
                chunk_index = Some(text.trim().parse().map_err(|_| {
                    ApiError::bad_request("chunkIndex must be a non-negative integer")
                })?);
            }
            _ => {}
        }
    }

    let upload_id = upload_id.ok_or_else(|| ApiError::bad_request("uploadId is required"))?;
    let chunk_index = chunk_index.ok_or_else(|| ApiError::bad_request("chunkIndex is required"))?;
    let chunk = chunk.ok_or_else(|| ApiError::bad_request("chunk is required"))?;

    let ack = state
        .library
        .put_chunk(&caller, &upload_id, chunk_index, &chunk)
        .await?;

    tracing::debug!(
        upload_id = %ack.upload_id,
        chunk_index = ack.chunk_index,
        received = ack.received_chunks,
        "Chunk staged"
    );
    Ok(Json(ack.into()))
}

/// POST /api/upload/complete - Assemble a staged upload.
#[utoipa::path(
    post,
    path = "/api/upload/complete",
    tag = "upload",
    request_body = CompleteUploadRequest,
    responses(
        (status = 200, description = "File assembled", body = FileEnvelope),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Upload or folder belongs to another user"),
        (status = 404, description = "Unknown upload or folder"),
        (status = 409, description = "Chunks are missing")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn complete_upload(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    ValidatedJson(req): ValidatedJson<CompleteUploadRequest>,
) -> Result<Json<FileEnvelope>, ApiError> {
    let request = CompleteUpload::new(req.upload_id, req.file_name, req.total_chunks)
        .with_mime_type(req.mime_type)
        .with_description(req.description)
        .with_service_category(req.service_category)
        .with_folder(req.folder_id);

    let file = state.library.complete_upload(&caller, &request).await?;
    Ok(Json(FileEnvelope::new(file)))
}

/// POST /api/upload/url - Register a file from a URL.
///
/// Links to embeddable hosts are kept by reference; other URLs are
/// downloaded.
#[utoipa::path(
    post,
    path = "/api/upload/url",
    tag = "upload",
    request_body = UrlUploadRequest,
    responses(
        (status = 200, description = "File registered", body = FileEnvelope),
        (status = 400, description = "Invalid URL or request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Folder belongs to another user"),
        (status = 502, description = "The URL could not be downloaded")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn upload_url(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    ValidatedJson(req): ValidatedJson<UrlUploadRequest>,
) -> Result<Json<FileEnvelope>, ApiError> {
    let request = UrlIngest::new(req.url.trim())
        .with_custom_name(req.custom_name)
        .with_description(req.description)
        .with_service_category(req.service_category)
        .with_folder(req.folder_id);

    let file = state.library.ingest_url(&caller, &request).await?;
    Ok(Json(FileEnvelope::new(file)))
}
