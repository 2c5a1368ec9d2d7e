//! Version deleter: removes a version's blocks, then the metadata that
//! referenced them.
//!
//! Blocks go first. If any block delete fails the metadata is left untouched,
//! so it never points at a manifest that is only partly gone without the
//! failure being reported. A block that is already missing counts as deleted,
//! which lets an interrupted delete be retried to completion.

use super::{
    error::{ObjectError, ObjectResult},
    metadata_service::MetadataService,
};
use crate::{
    models::{ObjectMetadata, Version},
    storage::{BlockStorage, StorageError},
};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct Deleter {
    storage: Arc<dyn BlockStorage>,
    metadata: MetadataService,
}

impl Deleter {
    pub fn new(storage: Arc<dyn BlockStorage>, metadata: MetadataService) -> Self {
        Self { storage, metadata }
    }

    /// Delete every version's blocks and then the metadata record.
    ///
    /// Versions committed after `metadata` was read survive, and the
    /// remaining metadata is returned; `None` means the object is gone.
    pub async fn delete(&self, metadata: &ObjectMetadata) -> ObjectResult<Option<ObjectMetadata>> {
        for version in &metadata.versions {
            self.delete_blocks(version).await?;
        }
        let remaining = self.metadata.delete(metadata).await?;
        info!(
            "deleted object {} with {} versions",
            metadata.id,
            metadata.versions.len()
        );
        Ok(remaining)
    }

    /// Delete one version's blocks and drop it from the record.
    ///
    /// Returns the remaining metadata, or `None` when the deleted version was
    /// the last one and the record is gone.
    pub async fn delete_version(
        &self,
        metadata: &ObjectMetadata,
        number: u64,
    ) -> ObjectResult<Option<ObjectMetadata>> {
        let version = metadata.version(number).ok_or_else(|| {
            ObjectError::NotFound(format!("version {} of object {}", number, metadata.id))
        })?;
        self.delete_blocks(version).await?;
        self.metadata.remove_version(metadata, number).await
    }

    async fn delete_blocks(&self, version: &Version) -> ObjectResult<()> {
        for header in &version.block_headers {
            let key = header.key();
            match self.storage.delete(&key).await {
                Ok(ack) if ack.success => debug!("deleted block {}", key),
                Ok(ack) => {
                    return Err(ObjectError::Upstream(StorageError::Rejected(format!(
                        "delete of block {}: {}",
                        key, ack.message
                    ))));
                }
                Err(err) if err.is_not_found() => debug!("block {} already gone", key),
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}
