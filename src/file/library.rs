//! The file library: shared state behind every file and folder operation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{
    ChangeFeed, ChunkStaging, FileRecord, FileRepository, FileStorage, Folder, FolderLocks,
    FolderRepository, UploadSessions, UrlIngestor,
};
use crate::auth::{require_owner, Caller};
use crate::config::{FilesConfig, IngestConfig};
use crate::db::{Database, DbPool};
use crate::{Result, VaultError};

/// Size limits applied to chunked uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    /// Largest accepted chunk in bytes.
    pub max_chunk_bytes: u64,
    /// Largest assembled upload in bytes.
    pub max_upload_bytes: u64,
    /// Highest accepted chunk count.
    pub max_total_chunks: u32,
}

impl UploadLimits {
    /// Take the limits from the `[files]` config section.
    pub fn from_config(config: &FilesConfig) -> Self {
        Self {
            max_chunk_bytes: config.max_chunk_size_bytes,
            max_upload_bytes: config.max_upload_size_bytes(),
            max_total_chunks: config.max_total_chunks,
        }
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self::from_config(&FilesConfig::default())
    }
}

/// What one sweep of stale uploads removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions idle past their TTL.
    pub expired_sessions: usize,
    /// Staging directories without a live session.
    pub orphaned_dirs: usize,
}

struct LibraryInner {
    db: Database,
    storage: FileStorage,
    staging: ChunkStaging,
    sessions: UploadSessions,
    feed: ChangeFeed,
    locks: FolderLocks,
    ingestor: UrlIngestor,
    limits: UploadLimits,
}

/// Shared handle to storage, staging, sessions and the database.
///
/// Cloning is cheap; all clones see the same state.
#[derive(Clone)]
pub struct Library {
    inner: Arc<LibraryInner>,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("storage", &self.inner.storage.base_path())
            .field("staging", &self.inner.staging.base_path())
            .field("limits", &self.inner.limits)
            .finish()
    }
}

impl Library {
    /// Build a library from configuration, creating storage directories.
    pub fn new(db: Database, files: &FilesConfig, ingest: &IngestConfig) -> Result<Self> {
        let storage = FileStorage::new(&files.storage_path)?;
        let staging = ChunkStaging::new(&files.staging_path)?;
        let ingestor = UrlIngestor::new(ingest.clone())?;
        Ok(Self::from_parts(
            db,
            storage,
            staging,
            ingestor,
            UploadLimits::from_config(files),
        ))
    }

    /// Build a library from already constructed parts.
    pub fn from_parts(
        db: Database,
        storage: FileStorage,
        staging: ChunkStaging,
        ingestor: UrlIngestor,
        limits: UploadLimits,
    ) -> Self {
        Self {
            inner: Arc::new(LibraryInner {
                db,
                storage,
                staging,
                sessions: UploadSessions::new(),
                feed: ChangeFeed::new(),
                locks: FolderLocks::new(),
                ingestor,
                limits,
            }),
        }
    }

    /// The database.
    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    pub(crate) fn pool(&self) -> &DbPool {
        self.inner.db.pool()
    }

    /// Stored file bytes.
    pub fn storage(&self) -> &FileStorage {
        &self.inner.storage
    }

    /// Staged chunks.
    pub fn staging(&self) -> &ChunkStaging {
        &self.inner.staging
    }

    /// Live upload sessions.
    pub fn sessions(&self) -> &UploadSessions {
        &self.inner.sessions
    }

    /// Change feed.
    pub fn feed(&self) -> &ChangeFeed {
        &self.inner.feed
    }

    pub(crate) fn locks(&self) -> &FolderLocks {
        &self.inner.locks
    }

    pub(crate) fn ingestor(&self) -> &UrlIngestor {
        &self.inner.ingestor
    }

    /// Upload limits.
    pub fn limits(&self) -> UploadLimits {
        self.inner.limits
    }

    /// Load a folder the caller may act on.
    pub(crate) async fn accessible_folder(&self, caller: &Caller, folder_id: i64) -> Result<Folder> {
        let folder = FolderRepository::new(self.pool())
            .get_by_id(folder_id)
            .await?
            .ok_or_else(|| VaultError::NotFound("folder".to_string()))?;
        require_owner(caller, &folder.owner_id, "folder")?;
        Ok(folder)
    }

    /// Load a file record the caller may act on.
    pub(crate) async fn accessible_file(&self, caller: &Caller, file_id: i64) -> Result<FileRecord> {
        let file = FileRepository::new(self.pool())
            .get_by_id(file_id)
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))?;
        require_owner(caller, &file.owner_id, "file")?;
        Ok(file)
    }

    /// Discard upload sessions idle for `ttl` and staging directories that
    /// no live session owns.
    pub async fn sweep_uploads(&self, ttl: Duration) -> Result<SweepReport> {
        let expired = self.inner.sessions.expire(ttl).await;
        for upload_id in &expired {
            if let Err(e) = self.inner.staging.remove_upload(upload_id).await {
                warn!(upload_id = %upload_id, error = %e, "Failed to remove expired upload chunks");
            }
        }

        let live = self.inner.sessions.live_ids().await;
        let orphaned = self.inner.staging.sweep_orphans(&live, ttl).await?;

        let report = SweepReport {
            expired_sessions: expired.len(),
            orphaned_dirs: orphaned,
        };
        if report != SweepReport::default() {
            info!(
                expired_sessions = report.expired_sessions,
                orphaned_dirs = report.orphaned_dirs,
                "Swept stale uploads"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// A library over an in-memory database and temporary directories.
    pub async fn library() -> (TempDir, Library) {
        library_with(UploadLimits::default(), IngestConfig::default()).await
    }

    pub async fn library_with(limits: UploadLimits, ingest: IngestConfig) -> (TempDir, Library) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let storage = FileStorage::new(dir.path().join("files")).unwrap();
        let staging = ChunkStaging::new(dir.path().join("staging")).unwrap();
        let ingestor = UrlIngestor::new(ingest).unwrap();
        let library = Library::from_parts(db, storage, staging, ingestor, limits);
        (dir, library)
    }
}
