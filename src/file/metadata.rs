//! File records and repository.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use crate::db::DbPool;
use crate::{Result, VaultError};

/// Transcription status of a file.
///
/// Any status may be set at any time; there is no enforced ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus {
    /// Waiting for a transcriptionist.
    #[default]
    Pending,
    /// Being transcribed.
    InProgress,
    /// Transcript delivered.
    Transcribed,
}

impl FileStatus {
    /// Database and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::InProgress => "in-progress",
            FileStatus::Transcribed => "transcribed",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(FileStatus::Pending),
            "in-progress" => Ok(FileStatus::InProgress),
            "transcribed" => Ok(FileStatus::Transcribed),
            other => Err(VaultError::Validation(format!("unknown status: {other}"))),
        }
    }
}

impl TryFrom<String> for FileStatus {
    type Error = VaultError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Where a file's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Uploaded in chunks.
    File,
    /// Fetched from, or linked to, a URL.
    Url,
}

impl SourceType {
    /// Database and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::File => "file",
            SourceType::Url => "url",
        }
    }
}

impl TryFrom<String> for SourceType {
    type Error = VaultError;

    fn try_from(value: String) -> Result<Self> {
        match value.as_str() {
            "file" => Ok(SourceType::File),
            "url" => Ok(SourceType::Url),
            other => Err(VaultError::Database(format!("unknown source type: {other}"))),
        }
    }
}

/// A stored file (or linked URL) and its metadata.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FileRecord {
    /// Unique file ID.
    pub id: i64,
    /// Owner of the file.
    pub owner_id: String,
    /// Display name.
    pub original_name: String,
    /// Name in storage; `None` for links kept by reference.
    pub stored_name: Option<String>,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: i64,
    /// Transcription status.
    #[sqlx(try_from = "String")]
    pub status: FileStatus,
    /// Containing folder (None for root).
    pub folder_id: Option<i64>,
    /// Requested service (e.g. "medical", "legal").
    pub service_category: Option<String>,
    /// Origin of the content.
    #[sqlx(try_from = "String")]
    pub source_type: SourceType,
    /// Source URL for URL records.
    pub source_url: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// When the record was created.
    pub uploaded_at: DateTime<Utc>,
}

impl FileRecord {
    /// Whether bytes for this record are held in storage.
    pub fn has_content(&self) -> bool {
        self.stored_name.is_some()
    }
}

/// Data for creating a new file record.
#[derive(Debug, Clone)]
pub struct NewFile {
    /// Owner of the file.
    pub owner_id: String,
    /// Display name.
    pub original_name: String,
    /// Name in storage.
    pub stored_name: Option<String>,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: i64,
    /// Containing folder.
    pub folder_id: Option<i64>,
    /// Requested service.
    pub service_category: Option<String>,
    /// Origin of the content.
    pub source_type: SourceType,
    /// Source URL.
    pub source_url: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
}

impl NewFile {
    /// Describe an assembled upload.
    pub fn uploaded(
        owner_id: impl Into<String>,
        original_name: impl Into<String>,
        stored_name: impl Into<String>,
        mime_type: impl Into<String>,
        size: i64,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            original_name: original_name.into(),
            stored_name: Some(stored_name.into()),
            mime_type: mime_type.into(),
            size,
            folder_id: None,
            service_category: None,
            source_type: SourceType::File,
            source_url: None,
            description: None,
        }
    }

    /// Describe a URL record. `stored_name` is `None` for links kept by reference.
    pub fn from_url(
        owner_id: impl Into<String>,
        original_name: impl Into<String>,
        source_url: impl Into<String>,
        stored_name: Option<String>,
        mime_type: impl Into<String>,
        size: i64,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            original_name: original_name.into(),
            stored_name,
            mime_type: mime_type.into(),
            size,
            folder_id: None,
            service_category: None,
            source_type: SourceType::Url,
            source_url: Some(source_url.into()),
            description: None,
        }
    }

    /// Set the containing folder.
    pub fn with_folder(mut self, folder_id: Option<i64>) -> Self {
        self.folder_id = folder_id;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Set the service category.
    pub fn with_service_category(mut self, service_category: Option<String>) -> Self {
        self.service_category = service_category;
        self
    }
}

/// Folder filter for file listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderFilter {
    /// Files anywhere.
    Any,
    /// Files at the root (no folder).
    Root,
    /// Files directly inside one folder.
    In(i64),
}

/// Most ids bound into one `IN (...)` list.
pub const MAX_IDS_PER_QUERY: usize = 500;

const FILE_COLUMNS: &str = "id, owner_id, original_name, stored_name, mime_type, size, status, \
     folder_id, service_category, source_type, source_url, description, uploaded_at";

/// Repository for file records.
pub struct FileRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FileRepository<'a> {
    /// Create a new FileRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new record with status `pending`.
    pub async fn create(&self, file: &NewFile) -> Result<FileRecord> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "INSERT INTO files (owner_id, original_name, stored_name, mime_type, size, status,
                                folder_id, service_category, source_type, source_url,
                                description, uploaded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {FILE_COLUMNS}"
        ))
        .bind(&file.owner_id)
        .bind(&file.original_name)
        .bind(&file.stored_name)
        .bind(&file.mime_type)
        .bind(file.size)
        .bind(FileStatus::Pending.as_str())
        .bind(file.folder_id)
        .bind(&file.service_category)
        .bind(file.source_type.as_str())
        .bind(&file.source_url)
        .bind(&file.description)
        .bind(Utc::now())
        .fetch_one(self.pool)
        .await
        .map_err(|e| VaultError::Database(e.to_string()))?;

        Ok(record)
    }

    /// Get a record by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| VaultError::Database(e.to_string()))?;

        Ok(record)
    }

    /// Fetch the records that exist among `ids`, in id order.
    ///
    /// Ids are bound in batches of [`MAX_IDS_PER_QUERY`] to stay under
    /// SQLite's bound-parameter limit.
    pub async fn get_many(&self, ids: &[i64]) -> Result<Vec<FileRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for batch in ids.chunks(MAX_IDS_PER_QUERY) {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("SELECT {FILE_COLUMNS} FROM files WHERE id IN ("));
            let mut separated = query.separated(", ");
            for id in batch {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            let found = query
                .build_query_as::<FileRecord>()
                .fetch_all(self.pool)
                .await
                .map_err(|e| VaultError::Database(e.to_string()))?;
            records.extend(found);
        }

        records.sort_by_key(|r| r.id);
        records.dedup_by_key(|r| r.id);
        Ok(records)
    }

    /// List records, newest first.
    ///
    /// `owner_id` restricts the listing to one owner; `None` lists everyone's.
    pub async fn list(&self, owner_id: Option<&str>, folder: FolderFilter) -> Result<Vec<FileRecord>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {FILE_COLUMNS} FROM files WHERE 1 = 1"));

        if let Some(owner) = owner_id {
            query.push(" AND owner_id = ").push_bind(owner.to_string());
        }
        match folder {
            FolderFilter::Any => {}
            FolderFilter::Root => {
                query.push(" AND folder_id IS NULL");
            }
            FolderFilter::In(folder_id) => {
                query.push(" AND folder_id = ").push_bind(folder_id);
            }
        }
        query.push(" ORDER BY uploaded_at DESC, id DESC");

        let records = query
            .build_query_as::<FileRecord>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| VaultError::Database(e.to_string()))?;

        Ok(records)
    }

    /// Set the status of a record. Returns `None` if it does not exist.
    pub async fn set_status(&self, id: i64, status: FileStatus) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "UPDATE files SET status = ? WHERE id = ? RETURNING {FILE_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| VaultError::Database(e.to_string()))?;

        Ok(record)
    }

    /// Move a record into a folder (or to root). Returns `None` if it does not exist.
    pub async fn set_folder(&self, id: i64, folder_id: Option<i64>) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "UPDATE files SET folder_id = ? WHERE id = ? RETURNING {FILE_COLUMNS}"
        ))
        .bind(folder_id)
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| VaultError::Database(e.to_string()))?;

        Ok(record)
    }

    /// Delete a record by ID.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| VaultError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Count files directly inside a folder.
    pub async fn count_by_folder(&self, folder_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE folder_id = ?")
            .bind(folder_id)
            .fetch_one(self.pool)
            .await
            .map_err(|e| VaultError::Database(e.to_string()))?;

        Ok(count)
    }
}
