//! Staging area for upload chunks.
//!
//! Each upload owns one directory; chunk `n` lives at
//! `{base}/{upload_id}/{n:08}.part`. Chunks are written to a temporary
//! name first and renamed into place, so a reader never sees a torn chunk.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::MAX_UPLOAD_ID_LENGTH;
use crate::{Result, VaultError};

/// Check that an upload id is 1..=128 characters of `[A-Za-z0-9_-]`.
pub fn validate_upload_id(upload_id: &str) -> Result<()> {
    if upload_id.is_empty() || upload_id.len() > MAX_UPLOAD_ID_LENGTH {
        return Err(VaultError::Validation(format!(
            "uploadId must be 1 to {MAX_UPLOAD_ID_LENGTH} characters"
        )));
    }
    if !upload_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(VaultError::Validation(
            "uploadId may only contain letters, digits, '_' and '-'".to_string(),
        ));
    }
    Ok(())
}

/// Per-upload chunk directories on local disk.
#[derive(Debug, Clone)]
pub struct ChunkStaging {
    base_path: PathBuf,
}

impl ChunkStaging {
    /// Create staging rooted at `base_path`, creating the directory if needed.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    /// Base directory of the staging area.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.base_path.join(upload_id)
    }

    /// Path of one staged chunk.
    pub fn chunk_path(&self, upload_id: &str, chunk_index: u32) -> PathBuf {
        self.upload_dir(upload_id)
            .join(format!("{chunk_index:08}.part"))
    }

    /// Stage one chunk, replacing any earlier copy of the same index.
    pub async fn write_chunk(&self, upload_id: &str, chunk_index: u32, data: &[u8]) -> Result<()> {
        validate_upload_id(upload_id)?;

        let dir = self.upload_dir(upload_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| VaultError::Storage(format!("cannot create staging dir: {e}")))?;

        let final_path = self.chunk_path(upload_id, chunk_index);
        let tmp_path = dir.join(format!(".{chunk_index:08}.{}.tmp", Uuid::new_v4().simple()));

        let written = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp_path, &final_path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(VaultError::Storage(format!(
                "cannot stage chunk {chunk_index} of {upload_id}: {e}"
            )));
        }

        debug!(upload_id, chunk_index, bytes = data.len(), "Chunk staged");
        Ok(())
    }

    /// Indices in `0..total_chunks` with no staged chunk, in ascending order.
    pub async fn missing_chunks(&self, upload_id: &str, total_chunks: u32) -> Result<Vec<u32>> {
        let mut missing = Vec::new();
        for index in 0..total_chunks {
            let present = fs::try_exists(self.chunk_path(upload_id, index))
                .await
                .map_err(|e| VaultError::Storage(e.to_string()))?;
            if !present {
                missing.push(index);
            }
        }
        Ok(missing)
    }

    /// Open a staged chunk for reading.
    pub async fn open_chunk(&self, upload_id: &str, chunk_index: u32) -> Result<fs::File> {
        fs::File::open(self.chunk_path(upload_id, chunk_index))
            .await
            .map_err(|e| {
                VaultError::Storage(format!(
                    "cannot read chunk {chunk_index} of {upload_id}: {e}"
                ))
            })
    }

    /// Remove every staged chunk of an upload. Missing uploads are ignored.
    pub async fn remove_upload(&self, upload_id: &str) -> Result<()> {
        match fs::remove_dir_all(self.upload_dir(upload_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove upload directories that no live session owns and that have
    /// not been touched for `older_than`. Returns how many were removed.
    pub async fn sweep_orphans(
        &self,
        live_uploads: &HashSet<String>,
        older_than: Duration,
    ) -> Result<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.base_path).await?;
        let now = SystemTime::now();

        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if live_uploads.contains(&name) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_dir() {
                continue;
            }
            let idle = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if idle < older_than {
                continue;
            }

            match fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(upload_id = %name, error = %e, "Failed to remove orphaned staging dir"),
            }
        }

        Ok(removed)
    }
}
