//! Error types for ScribeVault.

use thiserror::Error;

/// Common error type for ScribeVault.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or invalid credential.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The caller may not act on the resource.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The URL is not an http(s) URL with a host.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// No live upload session exists for the id.
    #[error("unknown upload: {0}")]
    UnknownUpload(String),

    /// Completion was requested before every chunk was staged.
    #[error("incomplete upload: missing chunks {missing:?}")]
    IncompleteUpload {
        /// Chunk indices that have not been staged.
        missing: Vec<u32>,
    },

    /// A folder move would make the folder its own ancestor.
    #[error("cannot move a folder into itself or one of its descendants")]
    CyclicMove,

    /// Bytes could not be written or read.
    #[error("storage error: {0}")]
    Storage(String),

    /// A remote resource could not be downloaded.
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for VaultError {
    fn from(e: sqlx::Error) -> Self {
        VaultError::Database(e.to_string())
    }
}

/// Result type alias for ScribeVault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_error_display() {
        let err = VaultError::Permission("not the owner".to_string());
        assert_eq!(err.to_string(), "permission denied: not the owner");
    }

    #[test]
    fn test_not_found_error_display() {
        let err = VaultError::NotFound("folder".to_string());
        assert_eq!(err.to_string(), "folder not found");
    }

    #[test]
    fn test_incomplete_upload_display() {
        let err = VaultError::IncompleteUpload {
            missing: vec![1, 3],
        };
        assert_eq!(err.to_string(), "incomplete upload: missing chunks [1, 3]");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VaultError = io_err.into();
        assert!(matches!(err, VaultError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_cyclic_move_display() {
        assert!(VaultError::CyclicMove.to_string().contains("descendants"));
    }
}
