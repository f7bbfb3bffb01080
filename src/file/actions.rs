//! Folder operations: create, rename, move, delete, list.

use tracing::{info, warn};

use super::{
    normalize_folder_name, FileEventKind, FileRepository, Folder, FolderFilter, FolderRepository,
    FolderTree, Library, NewFolder, Reparented,
};
use crate::auth::{require_owner, Caller};
use crate::{Result, VaultError};

impl Library {
    /// Folders visible to the caller: their own, or all for an admin.
    pub async fn list_folders(&self, caller: &Caller) -> Result<Vec<Folder>> {
        FolderRepository::new(self.pool())
            .list(caller.owner_scope())
            .await
    }

    /// Create a folder at the root or under `parent_id`.
    ///
    /// A subfolder belongs to the owner of its parent.
    pub async fn create_folder(
        &self,
        caller: &Caller,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<Folder> {
        let name = normalize_folder_name(name)?;
        let _parent_guard = self.locks().maybe_folder(parent_id).await;

        let new_folder = match parent_id {
            Some(parent_id) => {
                let parent = FolderRepository::new(self.pool())
                    .get_by_id(parent_id)
                    .await?
                    .ok_or_else(|| VaultError::NotFound("parent folder".to_string()))?;
                require_owner(caller, &parent.owner_id, "parent folder")?;
                NewFolder::new(parent.owner_id, name).with_parent(parent.id)
            }
            None => NewFolder::new(&caller.user_id, name),
        };

        let folder = FolderRepository::new(self.pool()).create(&new_folder).await?;
        info!(folder_id = folder.id, owner = %folder.owner_id, "Folder created");
        Ok(folder)
    }

    /// Rename a folder.
    pub async fn rename_folder(&self, caller: &Caller, folder_id: i64, new_name: &str) -> Result<Folder> {
        let name = normalize_folder_name(new_name)?;
        self.accessible_folder(caller, folder_id).await?;

        FolderRepository::new(self.pool())
            .rename(folder_id, &name)
            .await?
            .ok_or_else(|| VaultError::NotFound("folder".to_string()))
    }

    /// Move a folder under `target_parent_id`, or to the root when `None`.
    ///
    /// Moving a folder into itself or one of its descendants is a
    /// `CyclicMove` and changes nothing.
    pub async fn move_folder(
        &self,
        caller: &Caller,
        folder_id: i64,
        target_parent_id: Option<i64>,
    ) -> Result<Folder> {
        let _tree = self.locks().tree().await;
        let folder = self.accessible_folder(caller, folder_id).await?;

        if let Some(target_id) = target_parent_id {
            if target_id == folder_id {
                return Err(VaultError::CyclicMove);
            }
            let target = FolderRepository::new(self.pool())
                .get_by_id(target_id)
                .await?
                .ok_or_else(|| VaultError::NotFound("target folder".to_string()))?;
            require_owner(caller, &target.owner_id, "target folder")?;
            if target.owner_id != folder.owner_id {
                return Err(VaultError::Permission(
                    "folders can only be nested within one owner's tree".to_string(),
                ));
            }

            let links = FolderRepository::new(self.pool()).parent_links().await?;
            if FolderTree::from_links(links).is_self_or_descendant(folder_id, target_id) {
                return Err(VaultError::CyclicMove);
            }
        }

        let _target_guard = self.locks().maybe_folder(target_parent_id).await;
        let moved = FolderRepository::new(self.pool())
            .set_parent(folder_id, target_parent_id)
            .await?
            .ok_or_else(|| VaultError::NotFound("folder".to_string()))?;

        info!(folder_id, parent_id = ?target_parent_id, "Folder moved");
        Ok(moved)
    }

    /// Delete a folder. Its files and subfolders move up to its parent.
    pub async fn delete_folder(&self, caller: &Caller, folder_id: i64) -> Result<Reparented> {
        let _tree = self.locks().tree().await;
        let _folder_guard = self.locks().folder(folder_id).await;
        self.accessible_folder(caller, folder_id).await?;

        let files = FileRepository::new(self.pool());
        let affected: Vec<i64> = files
            .list(None, FolderFilter::In(folder_id))
            .await?
            .into_iter()
            .map(|f| f.id)
            .collect();

        let reparented = FolderRepository::new(self.pool())
            .delete_reparenting(folder_id)
            .await?
            .ok_or_else(|| VaultError::NotFound("folder".to_string()))?;

        // The delete is committed; a failed lookup only costs the events.
        match files.get_many(&affected).await {
            Ok(updated) => {
                for file in &updated {
                    self.feed().publish(FileEventKind::Updated, file);
                }
            }
            Err(e) => warn!(folder_id, error = %e, "Failed to announce reparented files"),
        }

        info!(
            folder_id,
            files = reparented.files,
            folders = reparented.folders,
            "Folder deleted"
        );
        Ok(reparented)
    }
}
