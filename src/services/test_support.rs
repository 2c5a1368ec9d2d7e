//! Block storage wrappers for exercising failure and latency paths.

use crate::{
    models::{Block, BlockHeader, BlockKey},
    storage::{
        BlockStorage, InMemoryBlockStorage, StorageError, block_storage::PutAck,
        error::StorageResult,
    },
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

/// Wraps an in-memory store, optionally delaying reads per block index,
/// rejecting writes at a given index and failing deletes at a given index.
#[derive(Default)]
pub struct ScriptedStorage {
    pub inner: Arc<InMemoryBlockStorage>,
    pub read_delays: HashMap<u64, Duration>,
    pub reject_put_at: Option<u64>,
    pub fail_delete_at: Option<u64>,
    /// Indices whose reads ran to completion, in completion order.
    pub completed_reads: Mutex<Vec<u64>>,
}

impl ScriptedStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed_reads(&self) -> Vec<u64> {
        self.completed_reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlockStorage for ScriptedStorage {
    async fn put(&self, block: &Block) -> StorageResult<PutAck> {
        if self.reject_put_at == Some(block.header.index) {
            return Ok(PutAck::rejected("disk full"));
        }
        self.inner.put(block).await
    }

    async fn get_block(&self, key: &BlockKey) -> StorageResult<Block> {
        if let Some(delay) = self.read_delays.get(&key.index) {
            tokio::time::sleep(*delay).await;
        }
        let block = self.inner.get_block(key).await;
        self.completed_reads.lock().unwrap().push(key.index);
        block
    }

    async fn get_block_header(&self, key: &BlockKey) -> StorageResult<BlockHeader> {
        self.inner.get_block_header(key).await
    }

    async fn delete(&self, key: &BlockKey) -> StorageResult<PutAck> {
        if self.fail_delete_at == Some(key.index) {
            return Err(StorageError::Backend("connection reset".into()));
        }
        self.inner.delete(key).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Deterministic, non-repeating test payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
