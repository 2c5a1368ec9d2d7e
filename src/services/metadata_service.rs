//! Metadata versioning service: version-number assignment and
//! create/append/update semantics on top of a [`MetadataRegistry`].
//!
//! Every mutation of one namespace key runs under a per-key async lock, so
//! concurrent uploads of the same object are serialized from lookup through
//! persist and never race on `last + 1`.

use super::error::{ObjectError, ObjectResult};
use crate::{
    models::{NamespaceKey, ObjectDescriptor, ObjectId, ObjectMetadata, Version, version},
    storage::MetadataRegistry,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Same version number backed by the same blocks.
fn same_manifest(a: &Version, b: &Version) -> bool {
    a.number == b.number
        && a.block_headers
            .iter()
            .map(|h| h.block_id)
            .eq(b.block_headers.iter().map(|h| h.block_id))
}

#[derive(Default)]
struct KeyedLocks {
    table: Mutex<HashMap<NamespaceKey, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one mutation of a namespace key.
struct KeyLock {
    locks: Arc<KeyedLocks>,
    key: NamespaceKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    async fn lock(self: &Arc<Self>, key: &NamespaceKey) -> KeyLock {
        let entry = {
            let mut table = self.table.lock().expect("lock poisoned");
            table.entry(key.clone()).or_default().clone()
        };
        let guard = entry.lock_owned().await;
        KeyLock {
            locks: self.clone(),
            key: key.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().expect("lock poisoned").len()
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        let mut table = self.locks.table.lock().expect("lock poisoned");
        // the table and this guard are the only holders: nobody is waiting
        if table
            .get(&self.key)
            .is_some_and(|entry| Arc::strong_count(entry) <= 2)
        {
            table.remove(&self.key);
        }
        self.guard.take();
    }
}

#[derive(Clone)]
pub struct MetadataService {
    registry: Arc<dyn MetadataRegistry>,
    locks: Arc<KeyedLocks>,
}

impl MetadataService {
    pub fn new(registry: Arc<dyn MetadataRegistry>) -> Self {
        Self {
            registry,
            locks: Arc::new(KeyedLocks::default()),
        }
    }

    /// Record `descriptor` as the next version of the object at its namespace
    /// key, creating the object (with version 0) if the key does not resolve.
    ///
    /// Returns the refreshed metadata.
    pub async fn put(&self, descriptor: ObjectDescriptor) -> ObjectResult<ObjectMetadata> {
        let manifest_size = version::manifest_size(&descriptor.block_headers);
        if descriptor.size != manifest_size {
            return Err(ObjectError::Validation(format!(
                "size {} does not match block manifest size {}",
                descriptor.size, manifest_size
            )));
        }

        let _lock = self.locks.lock(&descriptor.key).await;
        let key = &descriptor.key;
        let existing = match self
            .registry
            .metadata_by_object_name(&key.group, &key.partition, &key.path, &key.name)
            .await
        {
            Ok(metadata) => Some(metadata),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err.into()),
        };

        let is_new = existing.is_none();
        let mut metadata = match existing {
            Some(metadata) => metadata,
            None => {
                if !descriptor.id.is_valid() {
                    return Err(ObjectError::Validation("object id is unassigned".into()));
                }
                ObjectMetadata::new(descriptor.id, descriptor.key.clone())
            }
        };

        let number = metadata.next_version_number();
        metadata.append_version(Version::new(number, descriptor.block_headers));

        if is_new {
            self.registry.create(&metadata).await?;
        } else {
            self.registry.update(&metadata).await?;
        }

        info!(
            "object {} ({}) now at version {} ({} bytes)",
            metadata.id,
            key,
            number,
            metadata.size()
        );
        Ok(metadata)
    }

    /// Remove one version. Removing the last remaining version deletes the
    /// whole record, in which case `None` is returned.
    pub async fn remove_version(
        &self,
        metadata: &ObjectMetadata,
        number: u64,
    ) -> ObjectResult<Option<ObjectMetadata>> {
        let _lock = self.locks.lock(&metadata.namespace_key()).await;
        let mut current = self
            .registry
            .metadata_by_object_id(
                &metadata.group,
                &metadata.partition,
                &metadata.path,
                metadata.id,
            )
            .await?;

        if current.remove_version(number).is_none() {
            return Err(ObjectError::NotFound(format!(
                "version {} of object {}",
                number, metadata.id
            )));
        }

        if current.is_empty() {
            self.registry.delete(&current).await?;
            info!("object {} removed with its last version {}", current.id, number);
            Ok(None)
        } else {
            self.registry.update(&current).await?;
            info!("object {} version {} removed", current.id, number);
            Ok(Some(current))
        }
    }

    /// Delete the versions of `metadata` from its record, and the record
    /// itself once nothing else is left.
    ///
    /// The record is re-read under the key lock. Versions committed after
    /// `metadata` was read are kept, in which case the remaining metadata is
    /// returned.
    pub async fn delete(&self, metadata: &ObjectMetadata) -> ObjectResult<Option<ObjectMetadata>> {
        let _lock = self.locks.lock(&metadata.namespace_key()).await;
        let mut current = self
            .registry
            .metadata_by_object_id(
                &metadata.group,
                &metadata.partition,
                &metadata.path,
                metadata.id,
            )
            .await?;

        let before = current.versions.len();
        current
            .versions
            .retain(|v| !metadata.versions.iter().any(|seen| same_manifest(seen, v)));

        if current.is_empty() {
            self.registry.delete(&current).await?;
            info!("object {} metadata deleted", current.id);
            return Ok(None);
        }

        if current.versions.len() != before {
            current.modified_at = chrono::Utc::now();
            self.registry.update(&current).await?;
        }
        warn!(
            "object {} gained {} versions while being deleted; kept them",
            current.id,
            current.versions.len()
        );
        Ok(Some(current))
    }

    pub async fn metadata_by_object_name(&self, key: &NamespaceKey) -> ObjectResult<ObjectMetadata> {
        debug!("lookup by name {}", key);
        Ok(self
            .registry
            .metadata_by_object_name(&key.group, &key.partition, &key.path, &key.name)
            .await?)
    }

    pub async fn metadata_by_object_id(
        &self,
        group: &str,
        partition: &str,
        path: &str,
        id: ObjectId,
    ) -> ObjectResult<ObjectMetadata> {
        debug!("lookup by id {}/{}:{} #{}", group, partition, path, id);
        Ok(self
            .registry
            .metadata_by_object_id(group, partition, path, id)
            .await?)
    }

    pub async fn metadata_list_on_path(
        &self,
        group: &str,
        partition: &str,
        path: &str,
    ) -> ObjectResult<Vec<ObjectMetadata>> {
        Ok(self.registry.find_metadata(group, partition, path).await?)
    }

    pub async fn health_check(&self) -> ObjectResult<()> {
        Ok(self.registry.health_check().await?)
    }
}
