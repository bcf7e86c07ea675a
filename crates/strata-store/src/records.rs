//! Record shapes persisted by a [`RecordStore`](crate::RecordStore) backend.
//!
//! Each struct maps to one document in the backing store. Multi-record
//! consistency is the caller's job; the store only guarantees atomicity
//! within a single record.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use strata_types::{Checksum, ObjectType, Reference, UserMetadata};
use uuid::Uuid;

/// Truncate a timestamp to millisecond precision.
///
/// All dates written to the store pass through this so that values read
/// back compare equal to values held in memory regardless of the
/// backend's native timestamp resolution.
pub fn truncate_to_millis(date: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(date.timestamp_millis())
        .single()
        .unwrap_or(date)
}

/// One workspace container record.
///
/// The numeric id is permanent; the name is mutable but unique across all
/// workspaces. A record with `name == None` is a clone still materializing
/// and is invisible to every lookup, by id or by name, until the final
/// rename commits it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub id: u64,
    pub name: Option<String>,
    pub owner: String,
    pub moddate: DateTime<Utc>,
    /// Highest object id ever assigned in this workspace. Objects with
    /// ids at or below this value may not be visible yet mid-save.
    pub max_object_id: u64,
    pub locked: bool,
    pub deleted: bool,
    pub description: Option<String>,
    pub metadata: UserMetadata,
}

impl WorkspaceRecord {
    /// A fresh workspace container with no objects.
    pub fn new(
        id: u64,
        name: Option<String>,
        owner: impl Into<String>,
        moddate: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            owner: owner.into(),
            moddate: truncate_to_millis(moddate),
            max_object_id: 0,
            locked: false,
            deleted: false,
            description: None,
            metadata: UserMetadata::empty(),
        }
    }

    /// True while this record is a clone target that has not yet been
    /// given its final name.
    pub fn is_cloning(&self) -> bool {
        self.name.is_none()
    }
}

/// One object container record within a workspace.
///
/// Holds the mutable per-object state: name, visibility flags, the version
/// counter and the per-version incoming reference counts. The immutable
/// per-version data lives in [`VersionRecord`]s.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub workspace_id: u64,
    pub id: u64,
    pub name: String,
    pub deleted: bool,
    pub hidden: bool,
    /// Number of versions ever assigned. Version records may trail this
    /// counter briefly during a save.
    pub version_count: u32,
    /// `refcounts[v - 1]` is the number of incoming references to
    /// version `v`. Always `version_count` entries long.
    pub refcounts: Vec<u64>,
    pub moddate: DateTime<Utc>,
}

impl ObjectRecord {
    /// A fresh object container with no versions. Version counters start
    /// at zero and are advanced by
    /// [`RecordStore::append_versions`](crate::RecordStore::append_versions).
    pub fn new(workspace_id: u64, id: u64, name: impl Into<String>, moddate: DateTime<Utc>) -> Self {
        Self {
            workspace_id,
            id,
            name: name.into(),
            deleted: false,
            hidden: false,
            version_count: 0,
            refcounts: Vec::new(),
            moddate: truncate_to_millis(moddate),
        }
    }
}

/// One immutable object version record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub workspace_id: u64,
    pub object_id: u64,
    pub version: u32,
    pub saved_by: String,
    pub saved: DateTime<Utc>,
    pub object_type: ObjectType,
    pub checksum: Checksum,
    pub size: u64,
    /// User metadata captured at save time. Immutable, like the rest of
    /// the version.
    pub metadata: UserMetadata,
    /// Administrative metadata. The one mutable part of a version,
    /// updated through the metadata operations.
    pub admin_metadata: UserMetadata,
    /// Outgoing references extracted from the object data.
    pub refs: Vec<Reference>,
    /// Outgoing references from the provenance actions, flattened in
    /// action order. Re-split on read against the provenance record's
    /// per-action input counts.
    pub provenance_refs: Vec<Reference>,
    /// Id of the provenance record for this version. Copies and reverts
    /// share the source version's record.
    pub provenance: Uuid,
    /// Source of this version if it was created by a copy.
    pub copied: Option<Reference>,
    /// Version this one was reverted from, if any.
    pub reverted_from: Option<u32>,
    /// External ids extracted from the object data, keyed by id type.
    pub extracted_ids: std::collections::BTreeMap<String, Vec<String>>,
}

/// One access control entry: a user's explicit permission on a workspace.
///
/// The world-readable flag is an entry for [`strata_types::WORLD_USER`]
/// with [`Permission::Read`](strata_types::Permission::Read). Workspace
/// owners have an `Owner` entry in addition to the owner field on the
/// workspace record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRecord {
    pub workspace_id: u64,
    pub user: String,
    pub permission: strata_types::Permission,
}

// ----------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------
