//! Request DTOs for the HTTP API.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::validation::{no_control_chars, not_empty_trimmed};
use crate::file::FolderFilter;

/// Request to assemble a staged upload.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    /// Client-chosen upload id used for the chunks.
    #[validate(length(min = 1, max = 128, message = "uploadId must be 1-128 characters"))]
    pub upload_id: String,
    /// Display name for the file.
    #[validate(custom(function = "not_empty_trimmed"))]
    pub file_name: String,
    /// Number of chunks sent.
    #[validate(range(min = 1, message = "totalChunks must be at least 1"))]
    pub total_chunks: u32,
    /// MIME type; guessed from the name when absent.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Free-form description.
    #[serde(default)]
    #[validate(length(max = 2000, message = "description must be at most 2000 characters"))]
    pub description: Option<String>,
    /// Requested service.
    #[serde(default)]
    pub service_category: Option<String>,
    /// Folder to file the upload into.
    #[serde(default)]
    pub folder_id: Option<i64>,
}

/// Request to register a file from a URL.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UrlUploadRequest {
    /// Source URL (http or https).
    #[validate(custom(function = "not_empty_trimmed"))]
    pub url: String,
    /// Display name; derived from the URL when absent.
    #[serde(default)]
    #[validate(custom(function = "no_control_chars"))]
    pub custom_name: Option<String>,
    /// Free-form description.
    #[serde(default)]
    #[validate(length(max = 2000, message = "description must be at most 2000 characters"))]
    pub description: Option<String>,
    /// Requested service.
    #[serde(default)]
    pub service_category: Option<String>,
    /// Folder to file the record into.
    #[serde(default)]
    pub folder_id: Option<i64>,
}

/// Query for file listings.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListFilesQuery {
    /// Only files directly inside this folder.
    pub folder_id: Option<i64>,
    /// Only files at the root; ignored when `folderId` is given.
    pub root: Option<bool>,
}

impl ListFilesQuery {
    /// The folder filter this query describes.
    pub fn filter(&self) -> FolderFilter {
        match (self.folder_id, self.root) {
            (Some(id), _) => FolderFilter::In(id),
            (None, Some(true)) => FolderFilter::Root,
            _ => FolderFilter::Any,
        }
    }
}

/// Request to change one file's status.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateStatusRequest {
    /// `pending`, `in-progress` or `transcribed`.
    #[validate(custom(function = "not_empty_trimmed"))]
    pub status: String,
}

/// Request naming a set of files.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkFilesRequest {
    /// File ids.
    #[validate(length(min = 1, max = 1000, message = "fileIds must hold 1-1000 ids"))]
    pub file_ids: Vec<i64>,
}

/// Request to move files.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkMoveRequest {
    /// File ids.
    #[validate(length(min = 1, max = 1000, message = "fileIds must hold 1-1000 ids"))]
    pub file_ids: Vec<i64>,
    /// Target folder; `null` moves to the root.
    #[serde(default)]
    pub folder_id: Option<i64>,
}

/// Request to set the status of files.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusRequest {
    /// File ids.
    #[validate(length(min = 1, max = 1000, message = "fileIds must hold 1-1000 ids"))]
    pub file_ids: Vec<i64>,
    /// `pending`, `in-progress` or `transcribed`.
    pub status: String,
}

/// Request to create a folder.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    /// Folder name.
    #[validate(
        length(min = 1, max = 100, message = "name must be 1-100 characters"),
        custom(function = "not_empty_trimmed")
    )]
    pub name: String,
    /// Parent folder; root when absent.
    #[serde(default)]
    pub parent_id: Option<i64>,
}

/// Request to rename a folder.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RenameFolderRequest {
    /// New name.
    #[validate(
        length(min = 1, max = 100, message = "name must be 1-100 characters"),
        custom(function = "not_empty_trimmed")
    )]
    pub name: String,
}

/// Request to move a folder.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MoveFolderRequest {
    /// New parent; `null` moves to the root.
    #[serde(default)]
    pub parent_id: Option<i64>,
}
