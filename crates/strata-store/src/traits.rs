//! The record store abstraction.
//!
//! [`RecordStore`] is the seam between the workspace engine and the
//! document database holding its records. Implementations expose only
//! single-record atomic operations; everything multi-record is composed
//! above this trait.

use chrono::{DateTime, Utc};
use strata_types::{DependencyStatus, Permission, Provenance};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::records::{AclRecord, ObjectRecord, VersionRecord, WorkspaceRecord};

/// Type constraint for a version scan.
///
/// `name` matches the registered type name exactly; `major` and `minor`
/// narrow the match to one major or one exact version of the type. A
/// `minor` without a `major` is meaningless and ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeFilter {
    pub name: String,
    pub major: Option<u32>,
    pub minor: Option<u32>,
}

impl TypeFilter {
    pub fn matches(&self, ty: &strata_types::ObjectType) -> bool {
        if ty.name() != self.name {
            return false;
        }
        match (self.major, self.minor) {
            (Some(maj), Some(min)) => ty.major() == maj && ty.minor() == min,
            (Some(maj), None) => ty.major() == maj,
            _ => true,
        }
    }
}

/// Filter for scanning version records across workspaces.
///
/// All populated constraints must hold for a record to match. An empty
/// `workspaces` list matches nothing. Date bounds are exclusive.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VersionFilter {
    pub workspaces: Vec<u64>,
    pub min_object_id: Option<u64>,
    pub max_object_id: Option<u64>,
    pub object_type: Option<TypeFilter>,
    /// Match versions saved by any of these users.
    pub savers: Vec<String>,
    /// Each entry must be present, with exactly this value, in the
    /// version's user metadata.
    pub metadata: Vec<(String, String)>,
    pub saved_after: Option<DateTime<Utc>>,
    pub saved_before: Option<DateTime<Utc>>,
}

impl VersionFilter {
    /// A filter matching every version in the given workspaces.
    pub fn for_workspaces(workspaces: Vec<u64>) -> Self {
        Self {
            workspaces,
            ..Self::default()
        }
    }
}

/// Which record's user metadata a metadata mutation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataTarget {
    Workspace {
        workspace_id: u64,
    },
    Version {
        workspace_id: u64,
        object_id: u64,
        version: u32,
    },
}

/// A document-oriented store for workspace, object, version, provenance
/// and access control records.
///
/// The contract is deliberately narrow, so that any backend offering
/// single-document atomicity can implement it:
///
/// - There are no multi-record transactions. Counter increments, inserts
///   and flag updates are each atomic on exactly one record.
/// - Inserts into a unique index either fully succeed or fail with a
///   `Duplicate*` error. A caller racing on a name treats the duplicate
///   as "someone else won" and re-reads the winning record.
/// - Reads are point-in-time snapshots. A counter may run ahead of the
///   records it numbers; callers treat a missing-but-counted record as
///   not yet visible, never as corruption.
/// - Mutators return [`StoreError::MissingRecord`] when the target record
///   does not exist, except where a method documents a tolerant return.
///
/// [`StoreError::MissingRecord`]: crate::StoreError::MissingRecord
pub trait RecordStore: Send + Sync {
    // ------------------------------------------------------------------
    // Workspaces
    // ------------------------------------------------------------------

    /// Atomically draw the next workspace id from the global counter.
    /// Ids start at 1 and never repeat.
    fn next_workspace_id(&self) -> StoreResult<u64>;

    /// Insert a new workspace record.
    ///
    /// Fails with [`DuplicateWorkspaceName`] if the record is named and
    /// the name is taken. Records with `name == None` (clone targets)
    /// skip the name index entirely.
    ///
    /// [`DuplicateWorkspaceName`]: crate::StoreError::DuplicateWorkspaceName
    fn insert_workspace(&self, record: WorkspaceRecord) -> StoreResult<()>;

    /// Fetch a workspace by id. Clone targets are reported like any
    /// other record; resolution above this layer hides them.
    fn get_workspace_by_id(&self, workspace_id: u64) -> StoreResult<Option<WorkspaceRecord>>;

    /// Fetch a workspace by its unique name.
    fn get_workspace_by_name(&self, name: &str) -> StoreResult<Option<WorkspaceRecord>>;

    /// Batch form of [`get_workspace_by_id`]; absent ids are skipped.
    ///
    /// [`get_workspace_by_id`]: RecordStore::get_workspace_by_id
    fn get_workspaces_by_ids(&self, workspace_ids: &[u64]) -> StoreResult<Vec<WorkspaceRecord>> {
        let mut found = Vec::with_capacity(workspace_ids.len());
        for wsid in workspace_ids {
            if let Some(ws) = self.get_workspace_by_id(*wsid)? {
                found.push(ws);
            }
        }
        Ok(found)
    }

    /// Batch form of [`get_workspace_by_name`]; absent names are skipped.
    ///
    /// [`get_workspace_by_name`]: RecordStore::get_workspace_by_name
    fn get_workspaces_by_names(&self, names: &[String]) -> StoreResult<Vec<WorkspaceRecord>> {
        let mut found = Vec::with_capacity(names.len());
        for name in names {
            if let Some(ws) = self.get_workspace_by_name(name)? {
                found.push(ws);
            }
        }
        Ok(found)
    }

    /// Atomically add `n` to the workspace's object id counter and return
    /// the counter value after the increment. The caller owns ids
    /// `after - n + 1 ..= after`.
    fn increment_object_counter(&self, workspace_id: u64, n: u64) -> StoreResult<u64>;

    /// Set the workspace modification date.
    fn touch_workspace(&self, workspace_id: u64, moddate: DateTime<Utc>) -> StoreResult<()>;

    /// Rename a workspace, updating the unique name index atomically.
    fn rename_workspace(
        &self,
        workspace_id: u64,
        new_name: &str,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Give a nameless clone target its final name, making it visible.
    /// This is the commit point of a clone.
    fn finalize_clone(
        &self,
        workspace_id: u64,
        name: &str,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()>;

    fn set_workspace_deleted(
        &self,
        workspace_id: u64,
        deleted: bool,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Lock a workspace permanently. There is no unlock.
    fn lock_workspace(&self, workspace_id: u64) -> StoreResult<()>;

    fn set_workspace_description(
        &self,
        workspace_id: u64,
        description: Option<String>,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Change the owner recorded on the workspace record. ACL rows are
    /// adjusted separately via [`set_acl`](RecordStore::set_acl).
    fn set_workspace_owner(
        &self,
        workspace_id: u64,
        new_owner: &str,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()>;

    // ------------------------------------------------------------------
    // User metadata
    // ------------------------------------------------------------------

    /// If `key` exists in the target's metadata, atomically set its value
    /// and return true. Returns false, changing nothing, if the key is
    /// absent.
    fn set_metadata_key_if_present(
        &self,
        target: &MetadataTarget,
        key: &str,
        value: &str,
        moddate: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// If `key` is absent from the target's metadata, atomically add it
    /// and return true. Returns false, changing nothing, if the key is
    /// already present.
    fn add_metadata_key_if_absent(
        &self,
        target: &MetadataTarget,
        key: &str,
        value: &str,
        moddate: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Remove `key` from the target's metadata if present. Returns true
    /// if a value was removed.
    fn remove_metadata_key(
        &self,
        target: &MetadataTarget,
        key: &str,
        moddate: DateTime<Utc>,
    ) -> StoreResult<bool>;

    // ------------------------------------------------------------------
    // Access control
    // ------------------------------------------------------------------

    /// Fetch one user's explicit permission on one workspace. The world
    /// entry is queried with [`strata_types::WORLD_USER`].
    fn get_acl(&self, workspace_id: u64, user: &str) -> StoreResult<Option<Permission>>;

    /// All workspaces where `user` has an explicit entry.
    fn get_acls_for_user(&self, user: &str) -> StoreResult<Vec<AclRecord>>;

    /// One user's entries across a set of workspaces; workspaces without
    /// an entry for the user are simply absent from the result.
    fn get_user_acls_for_workspaces(
        &self,
        user: &str,
        workspace_ids: &[u64],
    ) -> StoreResult<Vec<AclRecord>>;

    /// Every user's entry on one workspace.
    fn get_all_acls_for_workspace(&self, workspace_id: u64) -> StoreResult<Vec<AclRecord>>;

    /// Upsert one ACL entry.
    fn set_acl(&self, workspace_id: u64, user: &str, permission: Permission) -> StoreResult<()>;

    /// Delete one ACL entry; absent entries are ignored.
    fn remove_acl(&self, workspace_id: u64, user: &str) -> StoreResult<()>;

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// Insert a new object container.
    ///
    /// Fails with [`DuplicateObjectName`] if a non-deleted object with
    /// the same name exists in the workspace; the caller re-resolves the
    /// winner and appends to it instead.
    ///
    /// [`DuplicateObjectName`]: crate::StoreError::DuplicateObjectName
    fn insert_object(&self, record: ObjectRecord) -> StoreResult<()>;

    /// Fetch an object by id, deleted or not.
    fn get_object(&self, workspace_id: u64, object_id: u64) -> StoreResult<Option<ObjectRecord>>;

    /// Fetch a non-deleted object by name. Deleted objects do not occupy
    /// names and are reachable only by id.
    fn get_object_by_live_name(
        &self,
        workspace_id: u64,
        name: &str,
    ) -> StoreResult<Option<ObjectRecord>>;

    /// Batch form of [`get_object`]; absent ids are skipped.
    ///
    /// [`get_object`]: RecordStore::get_object
    fn get_objects(&self, workspace_id: u64, object_ids: &[u64]) -> StoreResult<Vec<ObjectRecord>> {
        let mut found = Vec::with_capacity(object_ids.len());
        for objid in object_ids {
            if let Some(obj) = self.get_object(workspace_id, *objid)? {
                found.push(obj);
            }
        }
        Ok(found)
    }

    /// Batch fetch across workspaces by `(workspace id, object id)` key;
    /// absent keys are skipped.
    fn get_objects_by_keys(&self, keys: &[(u64, u64)]) -> StoreResult<Vec<ObjectRecord>> {
        let mut found = Vec::with_capacity(keys.len());
        for (wsid, objid) in keys {
            if let Some(obj) = self.get_object(*wsid, *objid)? {
                found.push(obj);
            }
        }
        Ok(found)
    }

    /// Batch form of [`get_object_by_live_name`]; absent names are
    /// skipped.
    ///
    /// [`get_object_by_live_name`]: RecordStore::get_object_by_live_name
    fn get_objects_by_live_names(
        &self,
        workspace_id: u64,
        names: &[String],
    ) -> StoreResult<Vec<ObjectRecord>> {
        let mut found = Vec::with_capacity(names.len());
        for name in names {
            if let Some(obj) = self.get_object_by_live_name(workspace_id, name)? {
                found.push(obj);
            }
        }
        Ok(found)
    }

    /// Every object container in a workspace, deleted included, ordered
    /// by object id.
    fn list_objects_in_workspace(&self, workspace_id: u64) -> StoreResult<Vec<ObjectRecord>>;

    /// Atomically advance an object's version counter by `n`, extending
    /// the refcount array with `n` zeroes and updating the object
    /// moddate. `set_hidden` additionally sets the hidden flag in the
    /// same atomic update when present.
    ///
    /// Returns the counter value after the increment; the caller owns
    /// versions `after - n + 1 ..= after`. Returns `Ok(None)`, without
    /// error, if the object record does not exist.
    fn append_versions(
        &self,
        workspace_id: u64,
        object_id: u64,
        n: u32,
        set_hidden: Option<bool>,
        moddate: DateTime<Utc>,
    ) -> StoreResult<Option<u32>>;

    /// Flip the deleted flag. Undeleting re-enters the object in the
    /// live name index and fails with [`DuplicateObjectName`] if the name
    /// has since been taken.
    ///
    /// [`DuplicateObjectName`]: crate::StoreError::DuplicateObjectName
    fn set_object_deleted(
        &self,
        workspace_id: u64,
        object_id: u64,
        deleted: bool,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()>;

    fn set_object_hidden(
        &self,
        workspace_id: u64,
        object_id: u64,
        hidden: bool,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Rename an object, updating the live name index atomically.
    fn rename_object(
        &self,
        workspace_id: u64,
        object_id: u64,
        new_name: &str,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Add `amount` to the incoming reference count of version `version`
    /// of every object in `targets` (a list of workspace ids, each with
    /// the object ids referenced at that version).
    ///
    /// Objects that are absent, or whose refcount array is shorter than
    /// `version`, are skipped; the referenced version may not be visible
    /// yet and the count for it cannot be recorded retroactively.
    fn bulk_increment_refcounts(
        &self,
        version: u32,
        amount: u64,
        targets: &[(u64, Vec<u64>)],
    ) -> StoreResult<()>;

    // ------------------------------------------------------------------
    // Versions
    // ------------------------------------------------------------------

    /// Insert a batch of immutable version records. Version numbers were
    /// drawn from the object's counter, so a key collision is corruption,
    /// not a race.
    fn insert_versions(&self, records: Vec<VersionRecord>) -> StoreResult<()>;

    fn get_version(
        &self,
        workspace_id: u64,
        object_id: u64,
        version: u32,
    ) -> StoreResult<Option<VersionRecord>>;

    /// Batch form of [`get_version`], preserving input order; absent
    /// keys yield `None`.
    ///
    /// [`get_version`]: RecordStore::get_version
    fn get_versions(&self, keys: &[(u64, u64, u32)]) -> StoreResult<Vec<Option<VersionRecord>>> {
        let mut found = Vec::with_capacity(keys.len());
        for (wsid, objid, ver) in keys {
            found.push(self.get_version(*wsid, *objid, *ver)?);
        }
        Ok(found)
    }

    /// All version records of one object, ascending by version.
    fn list_versions_for_object(
        &self,
        workspace_id: u64,
        object_id: u64,
    ) -> StoreResult<Vec<VersionRecord>>;

    /// Scan version records matching `filter`, skipping `skip` matches
    /// and returning at most `limit`.
    ///
    /// With `sorted`, results are ordered by workspace id and object id
    /// ascending, version descending; otherwise the order is
    /// backend-defined but stable across pages of one scan.
    fn find_versions(
        &self,
        filter: &VersionFilter,
        sorted: bool,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<VersionRecord>>;

    // ------------------------------------------------------------------
    // Provenance
    // ------------------------------------------------------------------

    /// Insert a batch of provenance records, returning the store-assigned
    /// record ids in input order.
    fn insert_provenance(&self, records: Vec<Provenance>) -> StoreResult<Vec<Uuid>>;

    /// Batch fetch by record id, preserving input order; absent ids
    /// yield `None`.
    fn get_provenance(&self, ids: &[Uuid]) -> StoreResult<Vec<Option<Provenance>>>;

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    /// Probe the backend. Never fails; an unreachable backend is reported
    /// in the returned status.
    fn status(&self) -> DependencyStatus;
}
