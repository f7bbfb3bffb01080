//! File handlers: listing, metadata, downloads and bulk operations.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::Response,
    Json,
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::file::{Archive, FileStatus};
use crate::web::dto::{
    BulkDeleteResponse, BulkFilesRequest, BulkMoveRequest, BulkMoveResponse, BulkStatusRequest,
    BulkStatusResponse, FileEnvelope, FileListResponse, ListFilesQuery, SuccessResponse,
    UpdateStatusRequest, ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::cors::ARCHIVE_SKIPPED_HEADER;
use crate::web::middleware::AuthUser;

/// Generate a safe Content-Disposition header value for file downloads.
///
/// Control characters, quotes and backslashes are replaced in the plain
/// `filename` parameter; non-ASCII names also get an RFC 5987 `filename*`.
pub(crate) fn content_disposition_header(filename: &str) -> String {
    let needs_encoding =
        !filename.is_ascii() || filename.chars().any(|c| c.is_control() || c == '"' || c == '\\');
    if !needs_encoding {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            c if !c.is_ascii() => '_',
            c => c,
        })
        .collect();
    let encoded = urlencoding::encode(filename);

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    )
}

/// Build a download response.
fn attachment(
    body: Body,
    length: u64,
    content_type: &str,
    filename: &str,
    skipped: Option<usize>,
) -> Result<Response, ApiError> {
    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(filename),
        )
        .header(header::CONTENT_LENGTH, length);
    if let Some(skipped) = skipped {
        builder = builder.header(ARCHIVE_SKIPPED_HEADER, skipped);
    }

    builder.body(body).map_err(|e| {
        tracing::error!("Failed to build response: {}", e);
        ApiError::internal("Failed to build response")
    })
}

/// Stream an archive's temp file as the response body.
fn zip_response(archive: Archive, filename: &str) -> Result<Response, ApiError> {
    let stream = ReaderStream::new(tokio::fs::File::from_std(archive.file));
    attachment(
        Body::from_stream(stream),
        archive.size,
        "application/zip",
        filename,
        Some(archive.skipped),
    )
}

fn parse_status(raw: &str) -> Result<FileStatus, ApiError> {
    raw.trim().parse::<FileStatus>().map_err(ApiError::from)
}

/// GET /api/files - List files visible to the caller.
#[utoipa::path(
    get,
    path = "/api/files",
    tag = "files",
    params(ListFilesQuery),
    responses(
        (status = 200, description = "Files, newest first", body = FileListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Folder belongs to another user"),
        (status = 404, description = "Folder not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<FileListResponse>, ApiError> {
    let files = state.library.list_files(&caller, query.filter()).await?;

    Ok(Json(FileListResponse {
        success: true,
        files: files.into_iter().map(Into::into).collect(),
    }))
}

/// GET /api/files/metadata/:id - Get file metadata.
#[utoipa::path(
    get,
    path = "/api/files/metadata/{id}",
    tag = "files",
    params(
        ("id" = i64, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File metadata", body = FileEnvelope),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "File not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(file_id): Path<i64>,
) -> Result<Json<FileEnvelope>, ApiError> {
    let file = state.library.get_file(&caller, file_id).await?;
    Ok(Json(FileEnvelope::new(file)))
}

/// GET /api/files/:id/download - Download a file.
///
/// Links kept by reference download as a `.url` shortcut.
#[utoipa::path(
    get,
    path = "/api/files/{id}/download",
    tag = "files",
    params(
        ("id" = i64, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "File not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(file_id): Path<i64>,
) -> Result<Response, ApiError> {
    let download = state.library.download_file(&caller, file_id).await?;
    let length = download.content.len() as u64;
    attachment(
        Body::from(download.content),
        length,
        &download.mime_type,
        &download.file_name,
        None,
    )
}

/// PUT /api/files/metadata/:id/status - Set a file's status.
#[utoipa::path(
    put,
    path = "/api/files/metadata/{id}/status",
    tag = "files",
    params(
        ("id" = i64, Path, description = "File ID")
    ),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = SuccessResponse),
        (status = 400, description = "Unknown status"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "File not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(file_id): Path<i64>,
    ValidatedJson(req): ValidatedJson<UpdateStatusRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let status = parse_status(&req.status)?;
    state.library.set_status(&caller, file_id, status).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// DELETE /api/files/metadata/:id - Delete a file.
#[utoipa::path(
    delete,
    path = "/api/files/metadata/{id}",
    tag = "files",
    params(
        ("id" = i64, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File deleted", body = SuccessResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "File not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(file_id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.library.delete_file(&caller, file_id).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// POST /api/files/bulk-move - Move files into a folder or to the root.
#[utoipa::path(
    post,
    path = "/api/files/bulk-move",
    tag = "files",
    request_body = BulkMoveRequest,
    responses(
        (status = 200, description = "Files moved", body = BulkMoveResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Target folder belongs to another user"),
        (status = 404, description = "Target folder not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn bulk_move(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    ValidatedJson(req): ValidatedJson<BulkMoveRequest>,
) -> Result<Json<BulkMoveResponse>, ApiError> {
    let outcome = state
        .library
        .bulk_move(&caller, &req.file_ids, req.folder_id)
        .await?;

    Ok(Json(BulkMoveResponse {
        success: true,
        requested: outcome.requested,
        moved: outcome.affected,
    }))
}

/// POST /api/files/bulk-delete - Delete files.
#[utoipa::path(
    post,
    path = "/api/files/bulk-delete",
    tag = "files",
    request_body = BulkFilesRequest,
    responses(
        (status = 200, description = "Files deleted", body = BulkDeleteResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn bulk_delete(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    ValidatedJson(req): ValidatedJson<BulkFilesRequest>,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    let outcome = state.library.bulk_delete(&caller, &req.file_ids).await?;

    Ok(Json(BulkDeleteResponse {
        success: true,
        requested: outcome.requested,
        deleted: outcome.affected,
    }))
}

/// POST /api/files/bulk-status - Set the status of files.
#[utoipa::path(
    post,
    path = "/api/files/bulk-status",
    tag = "files",
    request_body = BulkStatusRequest,
    responses(
        (status = 200, description = "Statuses updated", body = BulkStatusResponse),
        (status = 400, description = "Invalid request or unknown status"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn bulk_status(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    ValidatedJson(req): ValidatedJson<BulkStatusRequest>,
) -> Result<Json<BulkStatusResponse>, ApiError> {
    let status = parse_status(&req.status)?;
    let outcome = state
        .library
        .bulk_set_status(&caller, &req.file_ids, status)
        .await?;

    Ok(Json(BulkStatusResponse {
        success: true,
        requested: outcome.requested,
        updated: outcome.affected,
    }))
}

/// POST /api/files/bulk-download - Download files as a zip archive.
///
/// The `X-Archive-Skipped` header counts files that could not be read.
#[utoipa::path(
    post,
    path = "/api/files/bulk-download",
    tag = "files",
    request_body = BulkFilesRequest,
    responses(
        (status = 200, description = "Zip archive", content_type = "application/zip"),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "None of the files exist or are visible"),
        (status = 500, description = "None of the files could be read")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn bulk_download(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    ValidatedJson(req): ValidatedJson<BulkFilesRequest>,
) -> Result<Response, ApiError> {
    let archive = state.library.bulk_download(&caller, &req.file_ids).await?;
    zip_response(archive, "files.zip")
}

/// POST /api/files/download-folder/:folderId - Download a folder as a zip archive.
#[utoipa::path(
    post,
    path = "/api/files/download-folder/{folderId}",
    tag = "files",
    params(
        ("folderId" = i64, Path, description = "Folder ID")
    ),
    responses(
        (status = 200, description = "Zip archive", content_type = "application/zip"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Folder not found or empty")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn download_folder(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(folder_id): Path<i64>,
) -> Result<Response, ApiError> {
    let packed = state.library.download_folder(&caller, folder_id).await?;
    let filename = format!("{}.zip", packed.folder.name);
    zip_response(packed.archive, &filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition_header("visit.mp3"),
            "attachment; filename=\"visit.mp3\""
        );
    }

    #[test]
    fn test_content_disposition_escapes() {
        let header = content_disposition_header("a\"b\r\n.txt");
        assert!(!header.contains('\r'));
        assert!(!header.contains('\n'));
        assert!(header.starts_with("attachment; filename=\"a_b.txt\""));
        assert!(header.contains("filename*=UTF-8''"));
    }

    #[test]
    fn test_content_disposition_unicode() {
        let header = content_disposition_header("診察.mp3");
        assert!(header.contains("filename=\"__.mp3\""));
        assert!(header.contains("filename*=UTF-8''%E8%A8%BA%E5%AF%9F.mp3"));
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("in-progress").unwrap(), FileStatus::InProgress);
        assert_eq!(parse_status(" transcribed ").unwrap(), FileStatus::Transcribed);
        assert!(parse_status("done").is_err());
    }
}
