//! A version is one complete, independently downloadable snapshot of an object.

use super::block::BlockHeader;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Version {
    /// Assigned by the metadata versioning service, never by callers.
    pub number: u64,

    /// Sum of the sizes of `block_headers`.
    pub size: u64,

    /// Block manifest ordered by index.
    pub block_headers: Vec<BlockHeader>,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Version {
    pub fn new(number: u64, block_headers: Vec<BlockHeader>) -> Self {
        let now = Utc::now();
        Self {
            number,
            size: manifest_size(&block_headers),
            block_headers,
            created_at: now,
            modified_at: now,
        }
    }
}

pub fn manifest_size(headers: &[BlockHeader]) -> u64 {
    headers.iter().map(|h| u64::from(h.size)).sum()
}
