//! Durable byte storage for assembled and fetched files.
//!
//! Files live in a sharded directory structure keyed by their stored name:
//! ```text
//! {base_path}/
//! ├── ab/
//! │   └── ab12cd34-5678-90ab-cdef-123456789012.mp3
//! └── cd/
//!     └── cd90ab12-3456-7890-abcd-ef1234567890.bin
//! ```

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use crate::{Result, VaultError};

/// Longest extension carried over into a stored name.
const MAX_EXTENSION_LENGTH: usize = 16;

/// Physical file storage.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Create storage rooted at `base_path`, creating the directory if needed.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    /// Base directory of this storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Generate a fresh stored name that keeps the original extension.
    pub fn generate_stored_name(original_name: &str) -> String {
        format!("{}.{}", Uuid::new_v4(), Self::extract_extension(original_name))
    }

    /// Create an empty file for `stored_name` and return it for writing.
    pub async fn create(&self, stored_name: &str) -> Result<fs::File> {
        let path = self.file_path(stored_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::File::create(&path)
            .await
            .map_err(|e| VaultError::Storage(format!("cannot create {stored_name}: {e}")))
    }

    /// Save `content` under a new stored name and return that name.
    pub async fn save(&self, content: &[u8], original_name: &str) -> Result<String> {
        let stored_name = Self::generate_stored_name(original_name);
        let path = self.file_path(&stored_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, content)
            .await
            .map_err(|e| VaultError::Storage(format!("cannot write {stored_name}: {e}")))?;
        Ok(stored_name)
    }

    /// Load the full content of a stored file.
    pub async fn load(&self, stored_name: &str) -> Result<Vec<u8>> {
        match fs::read(self.file_path(stored_name)).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(VaultError::NotFound(format!("stored file {stored_name}")))
            }
            Err(e) => Err(VaultError::Storage(format!(
                "cannot read {stored_name}: {e}"
            ))),
        }
    }

    /// Delete a stored file. Returns `false` if it did not exist.
    pub async fn delete(&self, stored_name: &str) -> Result<bool> {
        match fs::remove_file(self.file_path(stored_name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Check if a stored file exists.
    pub async fn exists(&self, stored_name: &str) -> bool {
        fs::try_exists(self.file_path(stored_name))
            .await
            .unwrap_or(false)
    }

    /// Full path for a stored name: `{base_path}/{shard}/{stored_name}`.
    pub fn file_path(&self, stored_name: &str) -> PathBuf {
        // Stored names are generated here, but never let one climb out of base.
        let name = Path::new(stored_name)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("invalid");
        self.base_path.join(Self::shard(name)).join(name)
    }

    fn shard(stored_name: &str) -> &str {
        stored_name.get(..2).unwrap_or(stored_name)
    }

    /// Extension of `filename`, or "bin" when missing or unusual.
    fn extract_extension(filename: &str) -> String {
        Path::new(filename)
            .extension()
            .and_then(|s| s.to_str())
            .filter(|ext| {
                !ext.is_empty()
                    && ext.len() <= MAX_EXTENSION_LENGTH
                    && ext.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_else(|| "bin".to_string())
    }
}
