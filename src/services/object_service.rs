//! ObjectService: validates requests and sequences the uploader, downloader,
//! deleter and metadata service into the store's use cases. It is the only
//! component that talks to both block storage and the metadata registry.

use super::{
    deleter::Deleter,
    downloader::{ChunkSink, Downloader},
    error::{ObjectError, ObjectResult},
    metadata_service::MetadataService,
    uploader::Uploader,
};
use crate::{
    models::{NamespaceKey, ObjectDescriptor, ObjectId, ObjectMetadata, Version, version},
    storage::{BlockStorage, MetadataRegistry},
};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{info, warn};

/// Addresses an existing object by id within its path.
#[derive(Clone, Debug)]
pub struct ObjectLocator {
    pub group: String,
    pub partition: String,
    pub path: String,
    pub object_id: ObjectId,
}

/// Upload of a new object, or a new version of the object at `key`.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub key: NamespaceKey,

    /// Declared content length; must match the bytes actually received.
    pub size: u64,
}

#[derive(Clone)]
pub struct ObjectService {
    metadata: MetadataService,
    uploader: Uploader,
    downloader: Downloader,
    deleter: Deleter,
    storage: Arc<dyn BlockStorage>,
}

fn require(field: &str, value: &str) -> ObjectResult<()> {
    if value.trim().is_empty() {
        return Err(ObjectError::Validation(format!("{} is empty", field)));
    }
    Ok(())
}

fn validate_scope(group: &str, partition: &str, path: &str) -> ObjectResult<()> {
    require("group", group)?;
    require("partition", partition)?;
    require("path", path)
}

impl ObjectLocator {
    fn validate(&self) -> ObjectResult<()> {
        validate_scope(&self.group, &self.partition, &self.path)?;
        if !self.object_id.is_valid() {
            return Err(ObjectError::Validation("object id is invalid".into()));
        }
        Ok(())
    }
}

impl UploadRequest {
    fn validate(&self) -> ObjectResult<()> {
        validate_scope(&self.key.group, &self.key.partition, &self.key.path)?;
        require("name", &self.key.name)?;
        if self.size == 0 {
            return Err(ObjectError::Validation("size is 0".into()));
        }
        Ok(())
    }
}

impl ObjectService {
    pub fn new(
        storage: Arc<dyn BlockStorage>,
        registry: Arc<dyn MetadataRegistry>,
        download_concurrency: usize,
    ) -> Self {
        let metadata = MetadataService::new(registry);
        Self {
            uploader: Uploader::new(storage.clone()),
            downloader: Downloader::with_concurrency(storage.clone(), download_concurrency),
            deleter: Deleter::new(storage.clone(), metadata.clone()),
            metadata,
            storage,
        }
    }

    /// Replace the uploader, e.g. to use a smaller block threshold.
    #[cfg(test)]
    pub fn with_uploader(mut self, uploader: Uploader) -> Self {
        self.uploader = uploader;
        self
    }

    /// Chunk `reader` into blocks and record them as the next version of the
    /// object at `req.key`, minting a fresh object id if the key is new.
    pub async fn upload<R>(&self, req: UploadRequest, reader: R) -> ObjectResult<ObjectMetadata>
    where
        R: AsyncRead + Unpin + Send,
    {
        req.validate()?;

        let object_id = match self.find_by_name(&req.key).await {
            Ok(existing) => existing.id,
            Err(ObjectError::NotFound(_)) => ObjectId::generate(),
            Err(err) => return Err(err),
        };

        let headers = self.uploader.upload(object_id, reader).await?;
        let size = version::manifest_size(&headers);
        if size != req.size {
            self.uploader.discard(&headers).await;
            return Err(ObjectError::Validation(format!(
                "declared size {} but received {} bytes",
                req.size, size
            )));
        }

        let descriptor = ObjectDescriptor {
            id: object_id,
            key: req.key,
            size,
            block_headers: headers.clone(),
        };
        match self.metadata.put(descriptor).await {
            Ok(metadata) => Ok(metadata),
            Err(err) => {
                warn!("metadata commit for object {} failed: {}", object_id, err);
                self.uploader.discard(&headers).await;
                Err(err)
            }
        }
    }

    /// Upload a new version of the existing object at `locator`.
    pub async fn upload_version<R>(
        &self,
        locator: &ObjectLocator,
        size: u64,
        reader: R,
    ) -> ObjectResult<ObjectMetadata>
    where
        R: AsyncRead + Unpin + Send,
    {
        let metadata = self.find(locator).await?;
        let req = UploadRequest {
            key: metadata.namespace_key(),
            size,
        };
        self.upload(req, reader).await
    }

    /// Resolve the version a download would serve: `number` if given,
    /// otherwise the latest.
    pub async fn resolve_version(
        &self,
        locator: &ObjectLocator,
        number: Option<u64>,
    ) -> ObjectResult<(ObjectMetadata, Version)> {
        let metadata = self.find(locator).await?;
        let version = match number {
            Some(n) => metadata.version(n),
            None => metadata.last_version(),
        }
        .cloned()
        .ok_or_else(|| match number {
            Some(n) => ObjectError::NotFound(format!("version {} of object {}", n, metadata.id)),
            None => ObjectError::NotFound(format!("object {} has no versions", metadata.id)),
        })?;
        Ok((metadata, version))
    }

    async fn download_version<S>(&self, version: &Version, sink: &mut S) -> ObjectResult<u64>
    where
        S: ChunkSink + ?Sized,
    {
        self.downloader.download(&version.block_headers, sink).await
    }

    /// Download the latest or a specific version of an object into `sink`.
    pub async fn download<S>(
        &self,
        locator: &ObjectLocator,
        number: Option<u64>,
        sink: &mut S,
    ) -> ObjectResult<Version>
    where
        S: ChunkSink + ?Sized,
    {
        let (metadata, version) = self.resolve_version(locator, number).await?;
        let delivered = self.download_version(&version, sink).await?;
        info!(
            "served object {} version {} ({} bytes)",
            metadata.id, version.number, delivered
        );
        Ok(version)
    }

    /// Delete one version, or the whole object when `number` is `None`.
    ///
    /// Returns the remaining metadata, `None` once the object is gone.
    pub async fn delete(
        &self,
        locator: &ObjectLocator,
        number: Option<u64>,
    ) -> ObjectResult<Option<ObjectMetadata>> {
        let metadata = self.find(locator).await?;
        match number {
            Some(n) => {
                if metadata.version(n).is_none() {
                    return Err(ObjectError::NotFound(format!(
                        "version {} of object {}",
                        n, metadata.id
                    )));
                }
                self.deleter.delete_version(&metadata, n).await
            }
            None => self.deleter.delete(&metadata).await,
        }
    }

    pub async fn find(&self, locator: &ObjectLocator) -> ObjectResult<ObjectMetadata> {
        locator.validate()?;
        self.metadata
            .metadata_by_object_id(
                &locator.group,
                &locator.partition,
                &locator.path,
                locator.object_id,
            )
            .await
    }

    pub async fn find_by_name(&self, key: &NamespaceKey) -> ObjectResult<ObjectMetadata> {
        validate_scope(&key.group, &key.partition, &key.path)?;
        require("name", &key.name)?;
        self.metadata.metadata_by_object_name(key).await
    }

    pub async fn list(
        &self,
        group: &str,
        partition: &str,
        path: &str,
    ) -> ObjectResult<Vec<ObjectMetadata>> {
        validate_scope(group, partition, path)?;
        self.metadata.metadata_list_on_path(group, partition, path).await
    }

    /// Check both storage tiers.
    pub async fn health_check(&self) -> (ObjectResult<()>, ObjectResult<()>) {
        let blocks = self.storage.health_check().await.map_err(ObjectError::from);
        let metadata = self.metadata.health_check().await;
        (blocks, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::payload;
    use crate::storage::{InMemoryBlockStorage, InMemoryMetadataRegistry};
    use bytes::Bytes;

    struct Fixture {
        storage: Arc<InMemoryBlockStorage>,
        registry: Arc<InMemoryMetadataRegistry>,
        service: ObjectService,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(InMemoryBlockStorage::new());
        let registry = Arc::new(InMemoryMetadataRegistry::new());
        let service = ObjectService::new(storage.clone(), registry.clone(), 4);
        Fixture {
            storage,
            registry,
            service,
        }
    }

    fn key() -> NamespaceKey {
        NamespaceKey::new("g1", "p1", "/docs", "a.txt")
    }

    fn locator(id: ObjectId) -> ObjectLocator {
        ObjectLocator {
            group: "g1".into(),
            partition: "p1".into(),
            path: "/docs".into(),
            object_id: id,
        }
    }

    async fn upload(service: &ObjectService, content: &[u8]) -> ObjectMetadata {
        let req = UploadRequest {
            key: key(),
            size: content.len() as u64,
        };
        service.upload(req, content).await.unwrap()
    }

    #[tokio::test]
    async fn hello_world_scenario() {
        let fx = fixture();

        let first = upload(&fx.service, b"hello world").await;
        assert!(first.id.is_valid());
        let v0 = &first.versions[0];
        assert_eq!(v0.number, 0);
        assert_eq!(v0.size, 11);
        assert_eq!(v0.block_headers.len(), 1);
        assert_eq!(v0.block_headers[0].index, 0);
        assert_eq!(v0.block_headers[0].size, 11);
        assert_eq!(v0.block_headers[0].checksum, crc32fast::hash(b"hello world"));

        let mut latest = Vec::new();
        fx.service
            .download(&locator(first.id), None, &mut latest)
            .await
            .unwrap();
        assert_eq!(latest, b"hello world");

        let second = upload(&fx.service, b"HELLO WORLD!!").await;
        assert_eq!(second.id, first.id);
        assert_eq!(second.last_version().map(|v| (v.number, v.size)), Some((1, 13)));

        let mut old = Vec::new();
        let served = fx
            .service
            .download(&locator(first.id), Some(0), &mut old)
            .await
            .unwrap();
        assert_eq!(served.number, 0);
        assert_eq!(old, b"hello world");

        let mut new = Vec::new();
        fx.service
            .download(&locator(first.id), None, &mut new)
            .await
            .unwrap();
        assert_eq!(new, b"HELLO WORLD!!");
    }

    #[tokio::test]
    async fn multi_block_round_trip_through_service() {
        let storage = Arc::new(InMemoryBlockStorage::new());
        let registry = Arc::new(InMemoryMetadataRegistry::new());
        let service = ObjectService::new(storage.clone(), registry, 8)
            .with_uploader(Uploader::with_block_size(storage.clone(), 10));
        let data = payload(35);

        let metadata = upload(&service, &data).await;
        let indices: Vec<u64> = metadata.versions[0]
            .block_headers
            .iter()
            .map(|h| h.index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);

        let mut out = Vec::new();
        service
            .download(&locator(metadata.id), None, &mut out)
            .await
            .unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn validation_happens_before_side_effects() {
        let fx = fixture();
        let cases = [
            UploadRequest {
                key: NamespaceKey::new("", "p1", "/docs", "a.txt"),
                size: 1,
            },
            UploadRequest {
                key: NamespaceKey::new("g1", "p1", "/docs", " "),
                size: 1,
            },
            UploadRequest { key: key(), size: 0 },
        ];
        for req in cases {
            let err = fx.service.upload(req, &b"x"[..]).await.unwrap_err();
            assert!(matches!(err, ObjectError::Validation(_)));
        }
        assert_eq!(fx.storage.len(), 0);

        let err = fx
            .service
            .find(&locator(ObjectId::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectError::Validation(_)));
    }

    #[tokio::test]
    async fn size_mismatch_discards_blocks() {
        let fx = fixture();
        let req = UploadRequest { key: key(), size: 99 };
        let err = fx.service.upload(req, &b"short"[..]).await.unwrap_err();
        assert!(matches!(err, ObjectError::Validation(_)));
        assert_eq!(fx.storage.len(), 0);
        assert_eq!(fx.registry.len(), 0);
    }

    #[tokio::test]
    async fn missing_object_and_version_are_not_found() {
        let fx = fixture();
        let mut sink = Vec::new();
        let err = fx
            .service
            .download(&locator(ObjectId::generate()), None, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectError::NotFound(_)));

        let metadata = upload(&fx.service, b"content").await;
        let err = fx
            .service
            .download(&locator(metadata.id), Some(3), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectError::NotFound(_)));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn corrupted_payload_is_reported_as_corruption() {
        let fx = fixture();
        let metadata = upload(&fx.service, b"fragile").await;
        let header = &metadata.versions[0].block_headers[0];
        fx.storage.corrupt(&header.key(), Bytes::from_static(b"FRAGILE"));

        let mut sink = Vec::new();
        let err = fx
            .service
            .download(&locator(metadata.id), None, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectError::ChecksumMismatch { index: 0, .. }));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn delete_missing_version_leaves_everything() {
        let fx = fixture();
        upload(&fx.service, b"v0").await;
        let metadata = upload(&fx.service, b"v1").await;

        let err = fx
            .service
            .delete(&locator(metadata.id), Some(9))
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectError::NotFound(_)));
        assert_eq!(fx.storage.len(), 2);
        assert_eq!(fx.service.find(&locator(metadata.id)).await.unwrap(), metadata);
    }

    #[tokio::test]
    async fn deleting_versions_down_to_nothing() {
        let fx = fixture();
        upload(&fx.service, b"v0").await;
        let metadata = upload(&fx.service, b"v1").await;
        let loc = locator(metadata.id);

        let remaining = fx.service.delete(&loc, Some(0)).await.unwrap().unwrap();
        assert_eq!(remaining.versions.len(), 1);

        let mut sink = Vec::new();
        fx.service.download(&loc, None, &mut sink).await.unwrap();
        assert_eq!(sink, b"v1");

        assert!(fx.service.delete(&loc, Some(1)).await.unwrap().is_none());
        assert_eq!(fx.storage.len(), 0);
        let err = fx.service.find(&loc).await.unwrap_err();
        assert!(matches!(err, ObjectError::NotFound(_)));
    }

    #[tokio::test]
    async fn whole_delete_and_listing() {
        let fx = fixture();
        let a = upload(&fx.service, b"aaa").await;
        let b_key = NamespaceKey::new("g1", "p1", "/docs", "b.txt");
        fx.service
            .upload(UploadRequest { key: b_key.clone(), size: 3 }, &b"bbb"[..])
            .await
            .unwrap();

        let names: Vec<String> = fx
            .service
            .list("g1", "p1", "/docs")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);

        assert!(fx.service.delete(&locator(a.id), None).await.unwrap().is_none());
        assert_eq!(fx.service.list("g1", "p1", "/docs").await.unwrap().len(), 1);
        assert_eq!(fx.service.find_by_name(&b_key).await.unwrap().name, "b.txt");
    }

    #[tokio::test]
    async fn upload_version_by_id_appends() {
        let fx = fixture();
        let metadata = upload(&fx.service, b"first").await;
        let updated = fx
            .service
            .upload_version(&locator(metadata.id), 6, &b"second"[..])
            .await
            .unwrap();
        assert_eq!(updated.id, metadata.id);
        assert_eq!(updated.versions.len(), 2);
    }
}
