//! Locks serialising structural folder changes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

/// A tree-wide guard plus one lock per folder id.
///
/// Folder moves and deletes take the tree guard. Anything that puts content
/// into a folder, or removes it, also takes that folder's lock, which keeps
/// "move into X" from interleaving with "delete X".
#[derive(Debug, Default)]
pub struct FolderLocks {
    tree: Mutex<()>,
    folders: StdMutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl FolderLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the tree guard.
    pub async fn tree(&self) -> MutexGuard<'_, ()> {
        self.tree.lock().await
    }

    /// Acquire the lock for one folder.
    pub async fn folder(&self, folder_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut folders = self.folders.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on.
            folders.retain(|id, lock| *id == folder_id || Arc::strong_count(lock) > 1);
            folders.entry(folder_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Acquire the lock for an optional folder; root needs none.
    pub async fn maybe_folder(&self, folder_id: Option<i64>) -> Option<OwnedMutexGuard<()>> {
        match folder_id {
            Some(id) => Some(self.folder(id).await),
            None => None,
        }
    }

    /// Number of folder locks currently tracked.
    pub fn tracked(&self) -> usize {
        self.folders.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
