use super::error::StorageResult;
use crate::models::{ObjectId, ObjectMetadata};
use async_trait::async_trait;

/// Authoritative store of [`ObjectMetadata`] records.
///
/// Every lookup is scoped by `(group, partition, path)` and then either the
/// object name or its id. Lookups of absent objects return
/// [`StorageError::NotFound`](super::StorageError::NotFound), never an empty
/// record.
#[async_trait]
pub trait MetadataRegistry: Send + Sync {
    /// Insert a new record. `Conflict` if the namespace key is already taken.
    async fn create(&self, metadata: &ObjectMetadata) -> StorageResult<()>;

    /// Replace an existing record identified by its object id.
    async fn update(&self, metadata: &ObjectMetadata) -> StorageResult<()>;

    /// Remove the whole record.
    async fn delete(&self, metadata: &ObjectMetadata) -> StorageResult<()>;

    async fn metadata_by_object_name(
        &self,
        group: &str,
        partition: &str,
        path: &str,
        name: &str,
    ) -> StorageResult<ObjectMetadata>;

    async fn metadata_by_object_id(
        &self,
        group: &str,
        partition: &str,
        path: &str,
        id: ObjectId,
    ) -> StorageResult<ObjectMetadata>;

    /// All records on a path, ordered by name.
    async fn find_metadata(
        &self,
        group: &str,
        partition: &str,
        path: &str,
    ) -> StorageResult<Vec<ObjectMetadata>>;

    async fn health_check(&self) -> StorageResult<()>;
}
