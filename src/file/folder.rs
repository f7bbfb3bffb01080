//! Folder records and repository.

use chrono::{DateTime, Utc};

use super::MAX_FOLDER_NAME_LENGTH;
use crate::db::DbPool;
use crate::{Result, VaultError};

/// A folder in an owner's tree.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Folder {
    /// Unique folder ID.
    pub id: i64,
    /// Owner of the folder.
    pub owner_id: String,
    /// Folder name.
    pub name: String,
    /// Parent folder ID (None for root folders).
    pub parent_id: Option<i64>,
    /// When the folder was created.
    pub created_at: DateTime<Utc>,
}

/// Data for creating a new folder.
#[derive(Debug, Clone)]
pub struct NewFolder {
    /// Owner of the folder.
    pub owner_id: String,
    /// Folder name.
    pub name: String,
    /// Parent folder ID (None for root folders).
    pub parent_id: Option<i64>,
}

impl NewFolder {
    /// Create a new root folder for `owner_id`.
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            name: name.into(),
            parent_id: None,
        }
    }

    /// Set the parent folder.
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Trim a folder name and check that it is 1..=100 characters.
pub fn normalize_folder_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(VaultError::Validation(
            "folder name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_FOLDER_NAME_LENGTH {
        return Err(VaultError::Validation(format!(
            "folder name must be at most {MAX_FOLDER_NAME_LENGTH} characters"
        )));
    }
    if name.chars().any(|c| c.is_control() || c == '/' || c == '\\') {
        return Err(VaultError::Validation(
            "folder name contains invalid characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// What a folder delete moved up one level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reparented {
    /// Files moved to the deleted folder's parent.
    pub files: u64,
    /// Child folders moved to the deleted folder's parent.
    pub folders: u64,
}

const FOLDER_COLUMNS: &str = "id, owner_id, name, parent_id, created_at";

/// Repository for folder operations.
pub struct FolderRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FolderRepository<'a> {
    /// Create a new FolderRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new folder.
    pub async fn create(&self, folder: &NewFolder) -> Result<Folder> {
        let created = sqlx::query_as::<_, Folder>(&format!(
            "INSERT INTO folders (owner_id, name, parent_id, created_at)
             VALUES (?, ?, ?, ?)
             RETURNING {FOLDER_COLUMNS}"
        ))
        .bind(&folder.owner_id)
        .bind(&folder.name)
        .bind(folder.parent_id)
        .bind(Utc::now())
        .fetch_one(self.pool)
        .await
        .map_err(|e| VaultError::Database(e.to_string()))?;

        Ok(created)
    }

    /// Get a folder by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Folder>> {
        let folder = sqlx::query_as::<_, Folder>(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| VaultError::Database(e.to_string()))?;

        Ok(folder)
    }

    /// List folders, restricted to one owner when `owner_id` is given.
    pub async fn list(&self, owner_id: Option<&str>) -> Result<Vec<Folder>> {
        let folders = match owner_id {
            Some(owner) => {
                sqlx::query_as::<_, Folder>(&format!(
                    "SELECT {FOLDER_COLUMNS} FROM folders WHERE owner_id = ? ORDER BY name, id"
                ))
                .bind(owner)
                .fetch_all(self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Folder>(&format!(
                    "SELECT {FOLDER_COLUMNS} FROM folders ORDER BY owner_id, name, id"
                ))
                .fetch_all(self.pool)
                .await
            }
        }
        .map_err(|e| VaultError::Database(e.to_string()))?;

        Ok(folders)
    }

    /// List direct child folders of a parent.
    pub async fn list_children(&self, parent_id: i64) -> Result<Vec<Folder>> {
        let folders = sqlx::query_as::<_, Folder>(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE parent_id = ? ORDER BY name, id"
        ))
        .bind(parent_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| VaultError::Database(e.to_string()))?;

        Ok(folders)
    }

    /// Every `(id, parent_id)` pair, used to build the folder tree.
    pub async fn parent_links(&self) -> Result<Vec<(i64, Option<i64>)>> {
        let links = sqlx::query_as::<_, (i64, Option<i64>)>("SELECT id, parent_id FROM folders")
            .fetch_all(self.pool)
            .await
            .map_err(|e| VaultError::Database(e.to_string()))?;

        Ok(links)
    }

    /// Rename a folder. Returns `None` if it does not exist.
    pub async fn rename(&self, id: i64, name: &str) -> Result<Option<Folder>> {
        let folder = sqlx::query_as::<_, Folder>(&format!(
            "UPDATE folders SET name = ? WHERE id = ? RETURNING {FOLDER_COLUMNS}"
        ))
        .bind(name)
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| VaultError::Database(e.to_string()))?;

        Ok(folder)
    }

    /// Set a folder's parent. Returns `None` if it does not exist.
    pub async fn set_parent(&self, id: i64, parent_id: Option<i64>) -> Result<Option<Folder>> {
        let folder = sqlx::query_as::<_, Folder>(&format!(
            "UPDATE folders SET parent_id = ? WHERE id = ? RETURNING {FOLDER_COLUMNS}"
        ))
        .bind(parent_id)
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| VaultError::Database(e.to_string()))?;

        Ok(folder)
    }

    /// Delete a folder, moving its direct files and subfolders to its parent.
    ///
    /// All three steps run in one transaction. Returns `None` if the folder
    /// does not exist.
    pub async fn delete_reparenting(&self, id: i64) -> Result<Option<Reparented>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| VaultError::Database(e.to_string()))?;

        let parent: Option<Option<i64>> =
            sqlx::query_scalar("SELECT parent_id FROM folders WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| VaultError::Database(e.to_string()))?;

        let Some(parent_id) = parent else {
            return Ok(None);
        };

        let files = sqlx::query("UPDATE files SET folder_id = ? WHERE folder_id = ?")
            .bind(parent_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| VaultError::Database(e.to_string()))?
            .rows_affected();

        let folders = sqlx::query("UPDATE folders SET parent_id = ? WHERE parent_id = ?")
            .bind(parent_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| VaultError::Database(e.to_string()))?
            .rows_affected();

        sqlx::query("DELETE FROM folders WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| VaultError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| VaultError::Database(e.to_string()))?;

        Ok(Some(Reparented { files, folders }))
    }
}
