//! Single-file and bulk file operations, plus archive downloads.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tracing::{info, warn};

use super::{
    Archive, ArchivePlan, FileEventKind, FileRecord, FileRepository, FileStatus, Folder,
    FolderFilter, FolderRepository, FolderTree, Library,
};
use crate::auth::{can_place, Caller};
use crate::{Result, VaultError};

/// MIME type of an Internet shortcut file.
const SHORTCUT_MIME_TYPE: &str = "application/internet-shortcut";

/// Result of a bulk operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Distinct ids in the request.
    pub requested: usize,
    /// Ids the operation applied to.
    pub affected: usize,
}

/// Bytes of one file ready to send.
#[derive(Debug)]
pub struct DownloadResult {
    /// The record the bytes belong to.
    pub file: FileRecord,
    /// File content.
    pub content: Vec<u8>,
    /// Name to offer the client.
    pub file_name: String,
    /// Content type to send.
    pub mime_type: String,
}

/// A folder packed as a zip archive.
#[derive(Debug)]
pub struct FolderArchive {
    /// The folder that was packed.
    pub folder: Folder,
    /// The archive.
    pub archive: Archive,
}

/// Ids in request order with duplicates removed.
fn distinct(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn shortcut_body(url: &str) -> Vec<u8> {
    format!("[InternetShortcut]\r\nURL={url}\r\n").into_bytes()
}

impl Library {
    /// List files visible to the caller.
    pub async fn list_files(&self, caller: &Caller, folder: FolderFilter) -> Result<Vec<FileRecord>> {
        if let FolderFilter::In(folder_id) = folder {
            self.accessible_folder(caller, folder_id).await?;
        }
        FileRepository::new(self.pool())
            .list(caller.owner_scope(), folder)
            .await
    }

    /// Get one file record.
    pub async fn get_file(&self, caller: &Caller, file_id: i64) -> Result<FileRecord> {
        self.accessible_file(caller, file_id).await
    }

    /// Load a file's bytes. Links kept by reference come back as a
    /// `.url` shortcut.
    pub async fn download_file(&self, caller: &Caller, file_id: i64) -> Result<DownloadResult> {
        let file = self.accessible_file(caller, file_id).await?;

        match (&file.stored_name, &file.source_url) {
            (Some(stored_name), _) => {
                let content = self.storage().load(stored_name).await?;
                Ok(DownloadResult {
                    file_name: file.original_name.clone(),
                    mime_type: file.mime_type.clone(),
                    content,
                    file,
                })
            }
            (None, Some(url)) => Ok(DownloadResult {
                file_name: format!("{}.url", file.original_name),
                mime_type: SHORTCUT_MIME_TYPE.to_string(),
                content: shortcut_body(url),
                file,
            }),
            (None, None) => Err(VaultError::Storage(format!(
                "file {file_id} has no content"
            ))),
        }
    }

    /// Set one file's status. Any status may follow any other.
    pub async fn set_status(&self, caller: &Caller, file_id: i64, status: FileStatus) -> Result<FileRecord> {
        self.accessible_file(caller, file_id).await?;
        let updated = FileRepository::new(self.pool())
            .set_status(file_id, status)
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))?;
        self.feed().publish(FileEventKind::Updated, &updated);
        Ok(updated)
    }

    /// Delete one file: stored bytes first, then the record.
    pub async fn delete_file(&self, caller: &Caller, file_id: i64) -> Result<()> {
        let file = self.accessible_file(caller, file_id).await?;
        self.remove_file(&file).await?;
        Ok(())
    }

    async fn remove_file(&self, file: &FileRecord) -> Result<bool> {
        if let Some(stored_name) = &file.stored_name {
            self.storage().delete(stored_name).await?;
        }
        let deleted = FileRepository::new(self.pool()).delete(file.id).await?;
        if deleted {
            self.feed().publish(FileEventKind::Deleted, file);
            info!(file_id = file.id, "File deleted");
        }
        Ok(deleted)
    }

    /// Fetch a file for a bulk operation, or `None` to skip it.
    async fn bulk_target(&self, caller: &Caller, file_id: i64) -> Result<Option<FileRecord>> {
        let file = FileRepository::new(self.pool()).get_by_id(file_id).await?;
        Ok(file.filter(|f| caller.can_access(&f.owner_id)))
    }

    /// Move files into a folder, or to the root when `folder_id` is `None`.
    ///
    /// Only files whose folder actually changed are counted. A failure on
    /// one file is logged and the rest of the batch goes on.
    pub async fn bulk_move(
        &self,
        caller: &Caller,
        file_ids: &[i64],
        folder_id: Option<i64>,
    ) -> Result<BulkOutcome> {
        let ids = distinct(file_ids);
        let _folder_guard = self.locks().maybe_folder(folder_id).await;
        let target = match folder_id {
            Some(id) => Some(self.accessible_folder(caller, id).await?),
            None => None,
        };

        let files = FileRepository::new(self.pool());
        let mut moved = 0;
        for id in &ids {
            let file = match self.bulk_target(caller, *id).await {
                Ok(Some(file)) => file,
                Ok(None) => continue,
                Err(e) => {
                    warn!(file_id = *id, error = %e, "Bulk move skipped a file");
                    continue;
                }
            };
            if let Some(folder) = &target {
                if !can_place(caller, &file.owner_id, &folder.owner_id) {
                    continue;
                }
            }
            if file.folder_id == folder_id {
                continue;
            }
            match files.set_folder(file.id, folder_id).await {
                Ok(Some(updated)) => {
                    self.feed().publish(FileEventKind::Updated, &updated);
                    moved += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(file_id = file.id, error = %e, "Bulk move skipped a file"),
            }
        }

        info!(requested = ids.len(), moved, folder_id = ?folder_id, "Bulk move");
        Ok(BulkOutcome {
            requested: ids.len(),
            affected: moved,
        })
    }

    /// Delete files.
    pub async fn bulk_delete(&self, caller: &Caller, file_ids: &[i64]) -> Result<BulkOutcome> {
        let ids = distinct(file_ids);
        let mut deleted = 0;
        for id in &ids {
            let file = match self.bulk_target(caller, *id).await {
                Ok(Some(file)) => file,
                Ok(None) => continue,
                Err(e) => {
                    warn!(file_id = *id, error = %e, "Bulk delete skipped a file");
                    continue;
                }
            };
            match self.remove_file(&file).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => warn!(file_id = file.id, error = %e, "Bulk delete skipped a file"),
            }
        }

        info!(requested = ids.len(), deleted, "Bulk delete");
        Ok(BulkOutcome {
            requested: ids.len(),
            affected: deleted,
        })
    }

    /// Set the status of files. A failure on one file is logged and the
    /// rest of the batch goes on.
    pub async fn bulk_set_status(
        &self,
        caller: &Caller,
        file_ids: &[i64],
        status: FileStatus,
    ) -> Result<BulkOutcome> {
        let ids = distinct(file_ids);
        let files = FileRepository::new(self.pool());
        let mut updated = 0;
        for id in &ids {
            match self.bulk_target(caller, *id).await {
                Ok(Some(_)) => {}
                Ok(None) => continue,
                Err(e) => {
                    warn!(file_id = *id, error = %e, "Bulk status update skipped a file");
                    continue;
                }
            }
            match files.set_status(*id, status).await {
                Ok(Some(record)) => {
                    self.feed().publish(FileEventKind::Updated, &record);
                    updated += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(file_id = *id, error = %e, "Bulk status update skipped a file"),
            }
        }

        info!(requested = ids.len(), updated, status = status.as_str(), "Bulk status update");
        Ok(BulkOutcome {
            requested: ids.len(),
            affected: updated,
        })
    }

    /// Plan one record's archive entry.
    fn plan_entry(&self, plan: &mut ArchivePlan, dir: &[String], file: &FileRecord) {
        match (&file.stored_name, &file.source_url) {
            (Some(stored_name), _) => plan.stored(
                dir.to_vec(),
                &file.original_name,
                self.storage().file_path(stored_name),
                file.id,
            ),
            (None, Some(url)) => plan.shortcut(dir.to_vec(), &file.original_name, url),
            (None, None) => plan.missing(file.id),
        }
    }

    /// Pack files into a zip archive.
    ///
    /// Fails with `NotFound` when none of the ids is visible and with
    /// `Storage` when none of the visible files could be read.
    pub async fn bulk_download(&self, caller: &Caller, file_ids: &[i64]) -> Result<Archive> {
        let mut plan = ArchivePlan::new();
        let mut visible = 0;
        for id in distinct(file_ids) {
            let Some(file) = self.bulk_target(caller, id).await? else {
                continue;
            };
            visible += 1;
            self.plan_entry(&mut plan, &[], &file);
        }

        if visible == 0 {
            return Err(VaultError::NotFound("files".to_string()));
        }
        let archive = plan.write(self.archive_dir()).await?;
        info!(entries = archive.entries, skipped = archive.skipped, size = archive.size, "Files archived");
        Ok(archive)
    }

    /// Pack a folder and everything below it into a zip archive.
    ///
    /// Entry paths are relative to the folder; subfolders become
    /// directories.
    pub async fn download_folder(&self, caller: &Caller, folder_id: i64) -> Result<FolderArchive> {
        let folder = self.accessible_folder(caller, folder_id).await?;

        let folders = FolderRepository::new(self.pool())
            .list(Some(&folder.owner_id))
            .await?;
        let tree = FolderTree::from_folders(&folders);
        let names: HashMap<i64, String> = folders.iter().map(|f| (f.id, f.name.clone())).collect();

        let files = FileRepository::new(self.pool());
        let mut plan = ArchivePlan::new();
        let mut visible = 0;

        for id in std::iter::once(folder_id).chain(tree.descendants(folder_id)) {
            let dir = tree.relative_path(folder_id, id, &names);
            plan.directory(dir.clone());
            let mut contents = files.list(None, FolderFilter::In(id)).await?;
            contents.sort_by_key(|f| f.id);
            for file in contents.iter().filter(|f| caller.can_access(&f.owner_id)) {
                visible += 1;
                self.plan_entry(&mut plan, &dir, file);
            }
        }

        if visible == 0 {
            return Err(VaultError::NotFound("files in folder".to_string()));
        }

        let archive = plan.write(self.archive_dir()).await?;
        info!(
            folder_id,
            entries = archive.entries,
            skipped = archive.skipped,
            size = archive.size,
            "Folder archived"
        );
        Ok(FolderArchive { folder, archive })
    }

    /// Archives are written next to the staged chunks, on the same volume.
    fn archive_dir(&self) -> PathBuf {
        self.staging().base_path().to_path_buf()
    }
}
