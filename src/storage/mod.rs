//! The two storage tiers and their backends.
//!
//! Block storage owns raw block payloads addressed by
//! `(ObjectID, BlockID, Index)`; the metadata registry owns object records and
//! their version manifests. Services only ever see the traits, so either tier
//! can live in-process or behind a remote boundary.

pub mod block_storage;
pub mod disk;
pub mod error;
pub mod memory;
pub mod metadata_registry;
pub mod sqlite;

pub use block_storage::BlockStorage;
pub use disk::DiskBlockStorage;
pub use error::StorageError;
pub use memory::{InMemoryBlockStorage, InMemoryMetadataRegistry};
pub use metadata_registry::MetadataRegistry;
pub use sqlite::SqliteMetadataRegistry;
