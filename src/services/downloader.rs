//! Parallel fetcher: retrieves a version's blocks concurrently, verifies each
//! against its manifest checksum, and hands payloads to a sink in index order.
//!
//! Every block gets its own task and its own single-use result slot. The
//! consumer awaits slot 0, then 1, then 2, regardless of which fetch finishes
//! first. At most `concurrency` slots are open at a time: the fetch for block
//! `i + concurrency` starts only once slot `i` is taken, so a slow sink holds
//! back fetching instead of letting fetched payloads pile up. The first
//! failing slot ends the download; a shared cancellation token then stops
//! every fetch still in flight.

use super::error::{ObjectError, ObjectResult};
use crate::{
    models::{BlockHeader, block::checksum},
    storage::BlockStorage,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, channel::mpsc};
use std::{collections::VecDeque, io, sync::Arc};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 16;

/// Sequential consumer of downloaded payloads.
#[async_trait]
pub trait ChunkSink: Send {
    async fn accept(&mut self, chunk: Bytes) -> io::Result<()>;
}

#[async_trait]
impl ChunkSink for Vec<u8> {
    async fn accept(&mut self, chunk: Bytes) -> io::Result<()> {
        self.extend_from_slice(&chunk);
        Ok(())
    }
}

/// Feeds a streaming response body.
#[async_trait]
impl ChunkSink for mpsc::Sender<io::Result<Bytes>> {
    async fn accept(&mut self, chunk: Bytes) -> io::Result<()> {
        self.send(Ok(chunk)).await.map_err(io::Error::other)
    }
}

#[derive(Clone)]
pub struct Downloader {
    storage: Arc<dyn BlockStorage>,
    concurrency: usize,
}

impl Downloader {
    #[cfg(test)]
    pub fn new(storage: Arc<dyn BlockStorage>) -> Self {
        Self::with_concurrency(storage, DEFAULT_DOWNLOAD_CONCURRENCY)
    }

    /// Bound the number of fetched blocks not yet handed to the sink (at
    /// least 1).
    pub fn with_concurrency(storage: Arc<dyn BlockStorage>, concurrency: usize) -> Self {
        Self {
            storage,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch every block of `headers` and pass each payload to `sink` exactly
    /// once, in ascending index order.
    ///
    /// Returns the number of bytes delivered. Any fetch or checksum failure is
    /// fatal; the sink never sees the failed block or anything after it.
    pub async fn download<S>(&self, headers: &[BlockHeader], sink: &mut S) -> ObjectResult<u64>
    where
        S: ChunkSink + ?Sized,
    {
        let mut ordered = headers.to_vec();
        ordered.sort_by_key(|h| h.index);

        let token = CancellationToken::new();
        // cancels in-flight fetches on every return path
        let _guard = token.clone().drop_guard();

        let mut upcoming = ordered.iter();
        let mut slots = VecDeque::with_capacity(self.concurrency);
        for header in upcoming.by_ref().take(self.concurrency) {
            slots.push_back(self.spawn_fetch(header.clone(), &token));
        }

        let mut delivered = 0u64;
        for header in &ordered {
            let slot = slots.pop_front().ok_or(ObjectError::Cancelled)?;
            // a dropped sender means the task died without reporting
            let outcome = slot.await.map_err(|_| ObjectError::Cancelled)?;
            let data = match outcome {
                Ok(data) => data,
                Err(err) => {
                    error!("download aborted at block {}: {}", header.key(), err);
                    return Err(err);
                }
            };
            if let Some(next) = upcoming.next() {
                slots.push_back(self.spawn_fetch(next.clone(), &token));
            }
            delivered += data.len() as u64;
            sink.accept(data).await.map_err(ObjectError::Sink)?;
        }

        debug!("delivered {} blocks ({} bytes)", ordered.len(), delivered);
        Ok(delivered)
    }

    fn spawn_fetch(
        &self,
        header: BlockHeader,
        token: &CancellationToken,
    ) -> oneshot::Receiver<ObjectResult<Bytes>> {
        let (tx, rx) = oneshot::channel();
        let storage = self.storage.clone();
        let token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                outcome = fetch_block(storage, &header) => {
                    let _ = tx.send(outcome);
                }
            }
        });
        rx
    }
}

async fn fetch_block(storage: Arc<dyn BlockStorage>, header: &BlockHeader) -> ObjectResult<Bytes> {
    let block = storage.get_block(&header.key()).await?;
    let actual = checksum(&block.data);
    if actual != header.checksum {
        return Err(ObjectError::ChecksumMismatch {
            index: header.index,
            expected: header.checksum,
            actual,
        });
    }
    Ok(block.data)
}
