//! File management for ScribeVault.
//!
//! This module covers everything between an HTTP request and the disk:
//! - Chunk staging and upload sessions
//! - Assembly of staged chunks into stored files
//! - URL ingestion
//! - Per-owner folder hierarchy
//! - Bulk file operations and zip downloads
//! - A live change feed
//!
//! [`Library`] is the entry point; the rest are its building blocks.

mod actions;
pub mod archive;
mod bulk;
mod events;
mod folder;
pub mod ingest;
pub(crate) mod library;
mod locks;
mod metadata;
mod session;
pub mod staging;
mod storage;
mod tree;
mod upload;

pub use archive::{Archive, ArchiveBuilder, ArchivePlan};
pub use bulk::{BulkOutcome, DownloadResult, FolderArchive};
pub use events::{ChangeFeed, FileEvent, FileEventKind};
pub use folder::{normalize_folder_name, Folder, FolderRepository, NewFolder, Reparented};
pub use ingest::UrlIngestor;
pub use library::{Library, SweepReport, UploadLimits};
pub use locks::FolderLocks;
pub use metadata::{FileRecord, FileRepository, FileStatus, FolderFilter, NewFile, SourceType};
pub use session::{SessionState, UploadSession, UploadSessions};
pub use staging::ChunkStaging;
pub use storage::FileStorage;
pub use tree::FolderTree;
pub use upload::{normalize_file_name, ChunkAck, CompleteUpload, UrlIngest};

/// Maximum length for a display file name (in characters).
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Maximum length for a file description (in characters).
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

/// Maximum length for a folder name (in characters).
pub const MAX_FOLDER_NAME_LENGTH: usize = 100;

/// Maximum length for a service category (in characters).
pub const MAX_SERVICE_CATEGORY_LENGTH: usize = 64;

/// Maximum length for a client-chosen upload id.
pub const MAX_UPLOAD_ID_LENGTH: usize = 128;

/// MIME type recorded for links kept by reference.
pub const LINK_MIME_TYPE: &str = "text/uri-list";
