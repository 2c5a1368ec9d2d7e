//! Chunker: splits an upload stream into checksummed blocks and writes them
//! through block storage.

use super::error::{ObjectError, ObjectResult};
use crate::{
    models::{BLOCK_SIZE, Block, BlockHeader, ObjectId},
    storage::BlockStorage,
};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

/// Size of each read from the input stream.
const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Clone)]
pub struct Uploader {
    storage: Arc<dyn BlockStorage>,
    block_size: usize,
}

impl Uploader {
    pub fn new(storage: Arc<dyn BlockStorage>) -> Self {
        Self::with_block_size(storage, BLOCK_SIZE)
    }

    /// Use a smaller block threshold. Clamped to `1..=BLOCK_SIZE`.
    pub fn with_block_size(storage: Arc<dyn BlockStorage>, block_size: usize) -> Self {
        Self {
            storage,
            block_size: block_size.clamp(1, BLOCK_SIZE),
        }
    }

    /// Read `reader` to its end, writing a block every `block_size` bytes and
    /// one final block for any remainder.
    ///
    /// Returns the headers in index order. An empty stream yields no blocks.
    /// On failure the blocks already written by this call are deleted
    /// (best effort) before the error is returned.
    pub async fn upload<R>(&self, object_id: ObjectId, reader: R) -> ObjectResult<Vec<BlockHeader>>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut headers = Vec::new();
        match self.write_blocks(object_id, reader, &mut headers).await {
            Ok(()) => {
                debug!("object {} chunked into {} blocks", object_id, headers.len());
                Ok(headers)
            }
            Err(err) => {
                warn!(
                    "upload of object {} aborted after {} blocks: {}",
                    object_id,
                    headers.len(),
                    err
                );
                self.discard(&headers).await;
                Err(err)
            }
        }
    }

    async fn write_blocks<R>(
        &self,
        object_id: ObjectId,
        mut reader: R,
        headers: &mut Vec<BlockHeader>,
    ) -> ObjectResult<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut buffer = BytesMut::with_capacity(self.block_size);
        let mut chunk = vec![0u8; READ_BUFFER_SIZE];

        loop {
            // Ok(0) is the only end-of-stream signal.
            let n = reader.read(&mut chunk).await.map_err(ObjectError::Read)?;
            if n == 0 {
                break;
            }

            let mut rest = &chunk[..n];
            while !rest.is_empty() {
                let take = (self.block_size - buffer.len()).min(rest.len());
                buffer.extend_from_slice(&rest[..take]);
                rest = &rest[take..];

                if buffer.len() == self.block_size {
                    let data = buffer.split().freeze();
                    let header = self.commit(object_id, headers.len() as u64, data).await?;
                    headers.push(header);
                    buffer.reserve(self.block_size);
                }
            }
        }

        if !buffer.is_empty() {
            let header = self
                .commit(object_id, headers.len() as u64, buffer.freeze())
                .await?;
            headers.push(header);
        }
        Ok(())
    }

    async fn commit(&self, object_id: ObjectId, index: u64, data: Bytes) -> ObjectResult<BlockHeader> {
        let block = Block::seal(object_id, index, data);
        let ack = self.storage.put(&block).await?;
        if !ack.success {
            return Err(ObjectError::Upload(format!(
                "block {} rejected: {}",
                block.key(),
                ack.message
            )));
        }
        debug!(
            "committed block {} ({} bytes, crc {:08x})",
            block.key(),
            block.header.size,
            block.header.checksum
        );
        Ok(block.header)
    }

    /// Best-effort removal of blocks from an upload that will not be committed.
    pub async fn discard(&self, headers: &[BlockHeader]) {
        for header in headers {
            if let Err(err) = self.storage.delete(&header.key()).await {
                warn!("failed to discard block {}: {}", header.key(), err);
            }
        }
    }
}
