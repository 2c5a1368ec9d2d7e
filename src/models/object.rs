//! Addressing of objects and the descriptor submitted to the versioning service.

use super::{block::BlockHeader, ids::ObjectId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Addressable location of an object, analogous to bucket + prefix + filename.
///
/// Resolves to at most one [`ObjectMetadata`](super::metadata::ObjectMetadata).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamespaceKey {
    pub group: String,
    pub partition: String,
    pub path: String,
    pub name: String,
}

impl NamespaceKey {
    pub fn new(
        group: impl Into<String>,
        partition: impl Into<String>,
        path: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            partition: partition.into(),
            path: path.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}:{}/{}",
            self.group,
            self.partition,
            self.path.trim_end_matches('/'),
            self.name
        )
    }
}

/// A freshly chunked upload, ready to become the next version of an object.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ObjectDescriptor {
    /// Id to use if the namespace key does not resolve yet.
    pub id: ObjectId,
    pub key: NamespaceKey,

    /// Total payload size of `block_headers`.
    pub size: u64,
    pub block_headers: Vec<BlockHeader>,
}
