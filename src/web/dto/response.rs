//! Response DTOs for the HTTP API.
//!
//! Every JSON body carries `success`; errors use the shape in
//! [`crate::web::error::ErrorBody`].

use serde::Serialize;
use utoipa::ToSchema;

use crate::file::{ChunkAck, FileEvent, FileRecord, Folder};

// ============================================================================
// Files
// ============================================================================

/// File record as seen by clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    /// File ID.
    pub id: i64,
    /// Owner ID.
    pub owner_id: String,
    /// Display name.
    pub original_name: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes (0 for links kept by reference).
    pub size: i64,
    /// `pending`, `in-progress` or `transcribed`.
    pub status: String,
    /// Containing folder; `null` for the root.
    pub folder_id: Option<i64>,
    /// Requested service.
    pub service_category: Option<String>,
    /// `file` or `url`.
    pub source_type: String,
    /// Source URL for URL records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Upload timestamp (RFC 3339).
    pub uploaded_at: String,
}

impl From<FileRecord> for FileResponse {
    fn from(f: FileRecord) -> Self {
        Self {
            id: f.id,
            owner_id: f.owner_id,
            original_name: f.original_name,
            mime_type: f.mime_type,
            size: f.size,
            status: f.status.as_str().to_string(),
            folder_id: f.folder_id,
            service_category: f.service_category,
            source_type: f.source_type.as_str().to_string(),
            source_url: f.source_url,
            description: f.description,
            uploaded_at: f.uploaded_at.to_rfc3339(),
        }
    }
}

/// One file.
#[derive(Debug, Serialize, ToSchema)]
pub struct FileEnvelope {
    /// Always `true`.
    pub success: bool,
    /// The file.
    pub file: FileResponse,
}

impl FileEnvelope {
    /// Wrap a record.
    pub fn new(file: FileRecord) -> Self {
        Self {
            success: true,
            file: file.into(),
        }
    }
}

/// A list of files.
#[derive(Debug, Serialize, ToSchema)]
pub struct FileListResponse {
    /// Always `true`.
    pub success: bool,
    /// The files, newest first.
    pub files: Vec<FileResponse>,
}

/// Acknowledgement for a staged chunk.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadResponse {
    /// Always `true`.
    pub success: bool,
    /// Upload the chunk belongs to.
    pub upload_id: String,
    /// Index of the chunk.
    pub chunk_index: u32,
    /// Distinct chunks received so far.
    pub received_chunks: usize,
}

impl From<ChunkAck> for ChunkUploadResponse {
    fn from(ack: ChunkAck) -> Self {
        Self {
            success: true,
            upload_id: ack.upload_id,
            chunk_index: ack.chunk_index,
            received_chunks: ack.received_chunks,
        }
    }
}

/// Outcome of a bulk move.
#[derive(Debug, Serialize, ToSchema)]
pub struct BulkMoveResponse {
    /// Always `true`.
    pub success: bool,
    /// Distinct ids requested.
    pub requested: usize,
    /// Files now in the target.
    pub moved: usize,
}

/// Outcome of a bulk delete.
#[derive(Debug, Serialize, ToSchema)]
pub struct BulkDeleteResponse {
    /// Always `true`.
    pub success: bool,
    /// Distinct ids requested.
    pub requested: usize,
    /// Files deleted.
    pub deleted: usize,
}

/// Outcome of a bulk status change.
#[derive(Debug, Serialize, ToSchema)]
pub struct BulkStatusResponse {
    /// Always `true`.
    pub success: bool,
    /// Distinct ids requested.
    pub requested: usize,
    /// Files updated.
    pub updated: usize,
}

/// A change to a file, as sent on the event stream.
#[derive(Debug, Serialize, ToSchema)]
pub struct FileEventResponse {
    /// `created`, `updated` or `deleted`.
    pub kind: String,
    /// The record.
    pub file: FileResponse,
}

impl From<&FileEvent> for FileEventResponse {
    fn from(event: &FileEvent) -> Self {
        Self {
            kind: event.kind.as_str().to_string(),
            file: event.file.clone().into(),
        }
    }
}

// ============================================================================
// Folders
// ============================================================================

/// Folder as seen by clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FolderResponse {
    /// Folder ID.
    pub id: i64,
    /// Owner ID.
    pub owner_id: String,
    /// Folder name.
    pub name: String,
    /// Parent folder; `null` at the root.
    pub parent_id: Option<i64>,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

impl From<Folder> for FolderResponse {
    fn from(f: Folder) -> Self {
        Self {
            id: f.id,
            owner_id: f.owner_id,
            name: f.name,
            parent_id: f.parent_id,
            created_at: f.created_at.to_rfc3339(),
        }
    }
}

/// One folder.
#[derive(Debug, Serialize, ToSchema)]
pub struct FolderEnvelope {
    /// Always `true`.
    pub success: bool,
    /// The folder.
    pub folder: FolderResponse,
}

impl FolderEnvelope {
    /// Wrap a folder.
    pub fn new(folder: Folder) -> Self {
        Self {
            success: true,
            folder: folder.into(),
        }
    }
}

/// A list of folders.
#[derive(Debug, Serialize, ToSchema)]
pub struct FolderListResponse {
    /// Always `true`.
    pub success: bool,
    /// The folders.
    pub folders: Vec<FolderResponse>,
}

/// Plain acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct SuccessResponse {
    /// Always `true`.
    pub success: bool,
}

impl SuccessResponse {
    /// A successful acknowledgement.
    pub fn ok() -> Self {
        Self { success: true }
    }
}
