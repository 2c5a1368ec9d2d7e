//! On-disk block storage.
//!
//! Each block is kept as two files sharded beneath
//! `root/{shard}/{shard}/{ObjectID}_{BlockID}_{Index}`: the raw payload
//! (`.blk`) and its JSON header (`.hdr`). Files are written to a temporary name, fsynced and
//! renamed into place; the header is renamed last so a block only becomes
//! visible once its payload is durable.

use super::{
    block_storage::{BlockStorage, PutAck},
    error::{StorageError, StorageResult},
};
use crate::models::{Block, BlockHeader, BlockKey};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct DiskBlockStorage {
    root: PathBuf,
}

impl DiskBlockStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[cfg(test)]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Two-level shard identifiers for a block key: the first two bytes of
    /// MD5(key) as lowercase hex.
    fn block_shards(key: &BlockKey) -> (String, String) {
        let digest = md5::compute(key.to_string());
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Path of a block's files without extension.
    fn block_stem(&self, key: &BlockKey) -> PathBuf {
        let (shard_a, shard_b) = Self::block_shards(key);
        let mut path = self.root.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(format!("{}_{}_{}", key.object_id, key.block_id, key.index));
        path
    }

    fn payload_path(&self, key: &BlockKey) -> PathBuf {
        self.block_stem(key).with_extension("blk")
    }

    fn header_path(&self, key: &BlockKey) -> PathBuf {
        self.block_stem(key).with_extension("hdr")
    }

    async fn read_header(&self, key: &BlockKey) -> StorageResult<BlockHeader> {
        let raw = fs::read(self.header_path(key))
            .await
            .map_err(|err| not_found_or_io(err, key))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Durably write `bytes` to `dest` through a temporary sibling file.
    async fn write_atomic(dest: &Path, bytes: &[u8]) -> io::Result<()> {
        let parent = dest
            .parent()
            .ok_or_else(|| io::Error::other("block path missing parent directory"))?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let result = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, dest).await
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        result
    }

    /// Write the payload, then the header. A failed header write removes the
    /// payload again, since a payload without a header is unreachable.
    async fn write_block_files(payload: &Path, header: &Path, block: &Block) -> StorageResult<()> {
        Self::write_atomic(payload, &block.data).await?;
        let written = match serde_json::to_vec(&block.header) {
            Ok(raw) => Self::write_atomic(header, &raw).await.map_err(StorageError::from),
            Err(err) => Err(err.into()),
        };
        if written.is_err() {
            let _ = fs::remove_file(payload).await;
        }
        written
    }

    /// Remove empty shard directories up to (not including) the root.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.root) && current != self.root {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

fn not_found_or_io(err: io::Error, key: &BlockKey) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound(format!("block {}", key))
    } else {
        StorageError::Io(err)
    }
}

#[async_trait]
impl BlockStorage for DiskBlockStorage {
    async fn put(&self, block: &Block) -> StorageResult<PutAck> {
        let key = block.key();
        let header_path = self.header_path(&key);
        if fs::try_exists(&header_path).await? {
            return Ok(PutAck::rejected(format!("block {} already exists", key)));
        }
        if let Some(parent) = header_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        Self::write_block_files(&self.payload_path(&key), &header_path, block).await?;

        debug!("wrote block {} to {}", key, header_path.display());
        Ok(PutAck::ok())
    }

    async fn get_block(&self, key: &BlockKey) -> StorageResult<Block> {
        let header = self.read_header(key).await?;
        let data = fs::read(self.payload_path(key))
            .await
            .map_err(|err| not_found_or_io(err, key))?;
        Ok(Block {
            header,
            data: Bytes::from(data),
        })
    }

    async fn get_block_header(&self, key: &BlockKey) -> StorageResult<BlockHeader> {
        self.read_header(key).await
    }

    async fn delete(&self, key: &BlockKey) -> StorageResult<PutAck> {
        let header_path = self.header_path(key);
        fs::remove_file(&header_path)
            .await
            .map_err(|err| not_found_or_io(err, key))?;

        let payload_path = self.payload_path(key);
        match fs::remove_file(&payload_path).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload {} already missing", payload_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = header_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(PutAck::ok())
    }

    /// Best-effort write/read/delete of a check file under the root.
    async fn health_check(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await?;
        let check_path = self.root.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&check_path, b"readyz").await?;
        let read_back = fs::read(&check_path).await;
        let _ = fs::remove_file(&check_path).await;
        if read_back? != b"readyz" {
            return Err(StorageError::Backend("check file content mismatch".into()));
        }
        Ok(())
    }
}
