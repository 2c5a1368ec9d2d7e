use crate::storage::StorageError;
use std::io;
use thiserror::Error;

/// Failure reasons surfaced by the object services.
///
/// Callers rely on being able to tell "not found" apart from storage failure
/// and from corrupted data.
#[derive(Debug, Error)]
pub enum ObjectError {
    /// Missing or invalid request field; raised before any side effect.
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    /// A stored payload failed CRC verification on read.
    #[error("block {index} checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch { index: u64, expected: u32, actual: u32 },
    #[error("upload failed: {0}")]
    Upload(String),
    /// Transport or backend failure from either storage tier.
    #[error(transparent)]
    Upstream(StorageError),
    #[error("failed to read upload stream: {0}")]
    Read(#[source] io::Error),
    #[error("failed to deliver payload: {0}")]
    Sink(#[source] io::Error),
    #[error("operation cancelled")]
    Cancelled,
}

impl From<StorageError> for ObjectError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => ObjectError::NotFound(what),
            other => ObjectError::Upstream(other),
        }
    }
}

pub type ObjectResult<T> = Result<T, ObjectError>;
