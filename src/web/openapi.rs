//! OpenAPI document for the HTTP API.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use super::dto::{
    BulkDeleteResponse, BulkFilesRequest, BulkMoveRequest, BulkMoveResponse, BulkStatusRequest,
    BulkStatusResponse, ChunkUploadResponse, CompleteUploadRequest, CreateFolderRequest,
    FileEnvelope, FileEventResponse, FileListResponse, FileResponse, FolderEnvelope,
    FolderListResponse, FolderResponse, MoveFolderRequest, RenameFolderRequest, SuccessResponse,
    UpdateStatusRequest, UrlUploadRequest,
};
use super::error::{ErrorBody, ErrorCode, ErrorDetail};
use super::handlers;

#[derive(OpenApi)]
#[openapi(
    paths(
        // Upload
        handlers::upload::upload_chunk,
        handlers::upload::complete_upload,
        handlers::upload::upload_url,
        // Files
        handlers::file::list_files,
        handlers::file::get_file,
        handlers::file::download_file,
        handlers::file::update_status,
        handlers::file::delete_file,
        handlers::file::bulk_move,
        handlers::file::bulk_delete,
        handlers::file::bulk_status,
        handlers::file::bulk_download,
        handlers::file::download_folder,
        handlers::events::file_events,
        // Folders
        handlers::folder::list_folders,
        handlers::folder::create_folder,
        handlers::folder::rename_folder,
        handlers::folder::move_folder,
        handlers::folder::delete_folder,
    ),
    components(
        schemas(
            // Errors
            ErrorBody,
            ErrorDetail,
            ErrorCode,
            // Upload
            CompleteUploadRequest,
            UrlUploadRequest,
            ChunkUploadResponse,
            // Files
            FileResponse,
            FileEnvelope,
            FileListResponse,
            FileEventResponse,
            UpdateStatusRequest,
            BulkFilesRequest,
            BulkMoveRequest,
            BulkStatusRequest,
            BulkMoveResponse,
            BulkDeleteResponse,
            BulkStatusResponse,
            SuccessResponse,
            // Folders
            FolderResponse,
            FolderEnvelope,
            FolderListResponse,
            CreateFolderRequest,
            RenameFolderRequest,
            MoveFolderRequest,
        )
    ),
    tags(
        (name = "upload", description = "Chunked uploads and URL intake"),
        (name = "files", description = "File records, downloads and bulk operations"),
        (name = "folders", description = "Per-owner folder hierarchy"),
    ),
    modifiers(&SecurityAddon),
    info(
        title = "ScribeVault API",
        version = "0.1.0",
        description = "File management for transcription jobs",
    )
)]
pub struct ApiDoc;

/// Registers the bearer token scheme referenced by the paths.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
