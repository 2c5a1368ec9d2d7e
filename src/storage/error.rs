use std::io;
use thiserror::Error;

/// Errors returned across the block-storage and metadata-registry boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested block, object or version does not exist.
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    /// The backend acknowledged a request with `success = false`.
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("backend failure: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
