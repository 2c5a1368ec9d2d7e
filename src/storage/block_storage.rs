use super::error::StorageResult;
use crate::models::{Block, BlockHeader, BlockKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Acknowledgement returned by block writes and deletes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PutAck {
    pub success: bool,
    pub message: String,
}

impl PutAck {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Content-addressed store of raw block payloads keyed by
/// `ObjectID:BlockID:Index`.
///
/// Implementations must be safe under concurrent use by unrelated objects and
/// by unrelated blocks of the same object. Blocks are write-once: a block is
/// never updated in place, only written or removed entirely.
#[async_trait]
pub trait BlockStorage: Send + Sync {
    async fn put(&self, block: &Block) -> StorageResult<PutAck>;

    /// Fetch a block with its payload. Returns `NotFound` when absent.
    async fn get_block(&self, key: &BlockKey) -> StorageResult<Block>;

    async fn get_block_header(&self, key: &BlockKey) -> StorageResult<BlockHeader>;

    /// Remove a block entirely. Returns `NotFound` when absent.
    async fn delete(&self, key: &BlockKey) -> StorageResult<PutAck>;

    /// Cheap readiness check.
    async fn health_check(&self) -> StorageResult<()>;
}
