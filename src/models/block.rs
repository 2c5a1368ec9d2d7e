//! Blocks: fixed-maximum-size immutable slices of an object's content.

use super::ids::{BlockId, ObjectId};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on a single block payload (4 MiB).
pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Opaque placement hint carried on headers. Empty when unplaced.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Node(pub String);

/// Immutable description of one stored block, independent of its payload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub object_id: ObjectId,
    pub block_id: BlockId,

    /// Position of the block within its version; defines reassembly order.
    pub index: u64,

    /// Payload length in bytes.
    pub size: u32,

    /// CRC32 (IEEE) over the raw payload.
    pub checksum: u32,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub node: Node,
}

impl BlockHeader {
    pub fn key(&self) -> BlockKey {
        BlockKey {
            object_id: self.object_id,
            block_id: self.block_id,
            index: self.index,
        }
    }
}

/// Storage address of a block.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub object_id: ObjectId,
    pub block_id: BlockId,
    pub index: u64,
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.object_id, self.block_id, self.index)
    }
}

/// Header plus raw payload. Written once, never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub data: Bytes,
}

impl Block {
    /// Seal `data` into a block at `index` of `object_id`, drawing a fresh
    /// block id and computing its checksum.
    pub fn seal(object_id: ObjectId, index: u64, data: Bytes) -> Self {
        let header = BlockHeader {
            object_id,
            block_id: BlockId::generate(),
            index,
            size: data.len() as u32,
            checksum: checksum(&data),
            timestamp: Utc::now(),
            node: Node::default(),
        };
        Self { header, data }
    }

    pub fn key(&self) -> BlockKey {
        self.header.key()
    }
}

pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
