//! The namespace-addressable record owning an object's version history.

use super::{ids::ObjectId, object::NamespaceKey, version::Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub id: ObjectId,
    pub group: String,
    pub partition: String,
    pub path: String,
    pub name: String,

    /// Append-only, ordered by version number. Empty means logically deleted.
    pub versions: Vec<Version>,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl ObjectMetadata {
    /// Start a record for a namespace key with no versions yet.
    pub fn new(id: ObjectId, key: NamespaceKey) -> Self {
        let now = Utc::now();
        Self {
            id,
            group: key.group,
            partition: key.partition,
            path: key.path,
            name: key.name,
            versions: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn namespace_key(&self) -> NamespaceKey {
        NamespaceKey::new(&self.group, &self.partition, &self.path, &self.name)
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn last_version(&self) -> Option<&Version> {
        self.versions.last()
    }

    /// Number the next appended version receives.
    pub fn next_version_number(&self) -> u64 {
        self.last_version().map_or(0, |v| v.number + 1)
    }

    pub fn version(&self, number: u64) -> Option<&Version> {
        self.versions.iter().find(|v| v.number == number)
    }

    pub fn append_version(&mut self, version: Version) {
        self.modified_at = version.created_at;
        self.versions.push(version);
    }

    /// Remove a version by number, returning it if it existed.
    pub fn remove_version(&mut self, number: u64) -> Option<Version> {
        let pos = self.versions.iter().position(|v| v.number == number)?;
        self.modified_at = Utc::now();
        Some(self.versions.remove(pos))
    }

    /// Size of the latest version, 0 when there is none.
    pub fn size(&self) -> u64 {
        self.last_version().map_or(0, |v| v.size)
    }
}
