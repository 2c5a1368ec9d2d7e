//! `HashMap`-backed implementations of both tiers, for tests and
//! single-process deployments. State sits behind a `RwLock`; blocks and
//! records are cloned in and out.

use super::{
    block_storage::{BlockStorage, PutAck},
    error::{StorageError, StorageResult},
    metadata_registry::MetadataRegistry,
};
use crate::models::{Block, BlockHeader, BlockKey, NamespaceKey, ObjectId, ObjectMetadata};
use async_trait::async_trait;
use std::{collections::HashMap, sync::RwLock};
use tracing::debug;

#[derive(Default)]
pub struct InMemoryBlockStorage {
    blocks: RwLock<HashMap<BlockKey, Block>>,
}

impl InMemoryBlockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks currently stored.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.blocks.read().expect("lock poisoned").len()
    }

    #[cfg(test)]
    pub fn contains(&self, key: &BlockKey) -> bool {
        self.blocks.read().expect("lock poisoned").contains_key(key)
    }

    /// Overwrite a stored payload without touching its header.
    #[cfg(test)]
    pub fn corrupt(&self, key: &BlockKey, data: bytes::Bytes) {
        if let Some(block) = self.blocks.write().expect("lock poisoned").get_mut(key) {
            block.data = data;
        }
    }
}

#[async_trait]
impl BlockStorage for InMemoryBlockStorage {
    async fn put(&self, block: &Block) -> StorageResult<PutAck> {
        let key = block.key();
        let mut map = self.blocks.write().expect("lock poisoned");
        if map.contains_key(&key) {
            return Ok(PutAck::rejected(format!("block {} already exists", key)));
        }
        debug!("stored block {} ({} bytes)", key, block.data.len());
        map.insert(key, block.clone());
        Ok(PutAck::ok())
    }

    async fn get_block(&self, key: &BlockKey) -> StorageResult<Block> {
        self.blocks
            .read()
            .expect("lock poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("block {}", key)))
    }

    async fn get_block_header(&self, key: &BlockKey) -> StorageResult<BlockHeader> {
        self.blocks
            .read()
            .expect("lock poisoned")
            .get(key)
            .map(|block| block.header.clone())
            .ok_or_else(|| StorageError::NotFound(format!("block {}", key)))
    }

    async fn delete(&self, key: &BlockKey) -> StorageResult<PutAck> {
        match self.blocks.write().expect("lock poisoned").remove(key) {
            Some(_) => Ok(PutAck::ok()),
            None => Err(StorageError::NotFound(format!("block {}", key))),
        }
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Records {
    by_id: HashMap<ObjectId, ObjectMetadata>,
    by_name: HashMap<NamespaceKey, ObjectId>,
}

#[derive(Default)]
pub struct InMemoryMetadataRegistry {
    records: RwLock<Records>,
}

impl InMemoryMetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").by_id.len()
    }
}

fn in_scope(meta: &ObjectMetadata, group: &str, partition: &str, path: &str) -> bool {
    meta.group == group && meta.partition == partition && meta.path == path
}

#[async_trait]
impl MetadataRegistry for InMemoryMetadataRegistry {
    async fn create(&self, metadata: &ObjectMetadata) -> StorageResult<()> {
        let key = metadata.namespace_key();
        let mut records = self.records.write().expect("lock poisoned");
        if records.by_name.contains_key(&key) {
            return Err(StorageError::Conflict(format!("object {} already exists", key)));
        }
        if records.by_id.contains_key(&metadata.id) {
            return Err(StorageError::Conflict(format!(
                "object id {} already in use",
                metadata.id
            )));
        }
        records.by_name.insert(key, metadata.id);
        records.by_id.insert(metadata.id, metadata.clone());
        Ok(())
    }

    async fn update(&self, metadata: &ObjectMetadata) -> StorageResult<()> {
        let mut records = self.records.write().expect("lock poisoned");
        match records.by_id.get_mut(&metadata.id) {
            Some(existing) => {
                *existing = metadata.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("object {}", metadata.id))),
        }
    }

    async fn delete(&self, metadata: &ObjectMetadata) -> StorageResult<()> {
        let mut records = self.records.write().expect("lock poisoned");
        let removed = records
            .by_id
            .remove(&metadata.id)
            .ok_or_else(|| StorageError::NotFound(format!("object {}", metadata.id)))?;
        records.by_name.remove(&removed.namespace_key());
        Ok(())
    }

    async fn metadata_by_object_name(
        &self,
        group: &str,
        partition: &str,
        path: &str,
        name: &str,
    ) -> StorageResult<ObjectMetadata> {
        let key = NamespaceKey::new(group, partition, path, name);
        let records = self.records.read().expect("lock poisoned");
        records
            .by_name
            .get(&key)
            .and_then(|id| records.by_id.get(id))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("object {}", key)))
    }

    async fn metadata_by_object_id(
        &self,
        group: &str,
        partition: &str,
        path: &str,
        id: ObjectId,
    ) -> StorageResult<ObjectMetadata> {
        let records = self.records.read().expect("lock poisoned");
        records
            .by_id
            .get(&id)
            .filter(|meta| in_scope(meta, group, partition, path))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("object {}", id)))
    }

    async fn find_metadata(
        &self,
        group: &str,
        partition: &str,
        path: &str,
    ) -> StorageResult<Vec<ObjectMetadata>> {
        let records = self.records.read().expect("lock poisoned");
        let mut list: Vec<ObjectMetadata> = records
            .by_id
            .values()
            .filter(|meta| in_scope(meta, group, partition, path))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn meta(name: &str) -> ObjectMetadata {
        ObjectMetadata::new(
            ObjectId::generate(),
            NamespaceKey::new("g1", "p1", "/docs", name),
        )
    }

    #[tokio::test]
    async fn block_put_get_delete() {
        let store = InMemoryBlockStorage::new();
        let block = Block::seal(ObjectId::generate(), 0, Bytes::from_static(b"payload"));
        let key = block.key();

        assert!(store.put(&block).await.unwrap().success);
        assert_eq!(store.get_block(&key).await.unwrap(), block);
        assert_eq!(store.get_block_header(&key).await.unwrap(), block.header);

        assert!(store.delete(&key).await.unwrap().success);
        assert!(store.get_block(&key).await.unwrap_err().is_not_found());
        assert!(store.delete(&key).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn blocks_are_write_once() {
        let store = InMemoryBlockStorage::new();
        let block = Block::seal(ObjectId::generate(), 0, Bytes::from_static(b"v1"));
        assert!(store.put(&block).await.unwrap().success);

        let mut again = block.clone();
        again.data = Bytes::from_static(b"v2");
        assert!(!store.put(&again).await.unwrap().success);
        assert_eq!(store.get_block(&block.key()).await.unwrap().data, block.data);
    }

    #[tokio::test]
    async fn registry_create_rejects_duplicate_name() {
        let registry = InMemoryMetadataRegistry::new();
        registry.create(&meta("a.txt")).await.unwrap();
        let err = registry.create(&meta("a.txt")).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn registry_lookups_are_scoped() {
        let registry = InMemoryMetadataRegistry::new();
        let record = meta("a.txt");
        registry.create(&record).await.unwrap();

        let by_id = registry
            .metadata_by_object_id("g1", "p1", "/docs", record.id)
            .await
            .unwrap();
        assert_eq!(by_id, record);

        let wrong_path = registry
            .metadata_by_object_id("g1", "p1", "/other", record.id)
            .await
            .unwrap_err();
        assert!(wrong_path.is_not_found());

        let missing = registry
            .metadata_by_object_name("g1", "p1", "/docs", "b.txt")
            .await
            .unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn registry_find_orders_by_name_and_delete_frees_name() {
        let registry = InMemoryMetadataRegistry::new();
        let b = meta("b.txt");
        let a = meta("a.txt");
        registry.create(&b).await.unwrap();
        registry.create(&a).await.unwrap();

        let names: Vec<String> = registry
            .find_metadata("g1", "p1", "/docs")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);

        registry.delete(&a).await.unwrap();
        assert_eq!(registry.len(), 1);
        registry.create(&meta("a.txt")).await.unwrap();
    }
}
