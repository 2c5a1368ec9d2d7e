//! Core data model of the object store.
//!
//! Blocks and their headers describe raw content held by block storage;
//! versions and object metadata describe how that content is assembled and
//! addressed, and live in the metadata registry. Every type serializes
//! naturally as JSON via `serde`, which is also the shape exchanged with the
//! two storage tiers.

pub mod block;
pub mod ids;
pub mod metadata;
pub mod object;
pub mod version;

pub use block::{BLOCK_SIZE, Block, BlockHeader, BlockKey};
pub use ids::ObjectId;
pub use metadata::ObjectMetadata;
pub use object::{NamespaceKey, ObjectDescriptor};
pub use version::Version;
