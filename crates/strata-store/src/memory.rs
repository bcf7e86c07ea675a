//! In-memory [`RecordStore`] backend.
//!
//! Backs every record collection with `RwLock`-protected maps. Each trait
//! method takes the lock exactly once, so every operation is atomic with
//! respect to every other, which is a strict superset of the
//! single-record atomicity the trait demands. Used in tests and as the
//! reference implementation for the trait's semantics.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use strata_types::{DependencyStatus, Permission, Provenance, UserMetadata};
use tracing::warn;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::records::{truncate_to_millis, AclRecord, ObjectRecord, VersionRecord, WorkspaceRecord};
use crate::traits::{MetadataTarget, RecordStore, VersionFilter};

#[derive(Default)]
struct State {
    workspace_counter: u64,
    workspaces: HashMap<u64, WorkspaceRecord>,
    /// name -> workspace id; named records only, so clone targets are
    /// absent until finalized.
    workspace_names: HashMap<String, u64>,
    objects: BTreeMap<(u64, u64), ObjectRecord>,
    /// (workspace id, name) -> object id; non-deleted objects only.
    live_object_names: HashMap<(u64, String), u64>,
    versions: BTreeMap<(u64, u64, u32), VersionRecord>,
    acls: BTreeMap<(u64, String), Permission>,
    provenance: HashMap<Uuid, Provenance>,
}

impl State {
    fn metadata_mut(
        &mut self,
        target: &MetadataTarget,
    ) -> StoreResult<(&mut UserMetadata, Option<&mut DateTime<Utc>>)> {
        match target {
            MetadataTarget::Workspace { workspace_id } => {
                let ws = self.workspaces.get_mut(workspace_id).ok_or_else(|| {
                    StoreError::MissingRecord(format!("workspace {workspace_id}"))
                })?;
                Ok((&mut ws.metadata, Some(&mut ws.moddate)))
            }
            MetadataTarget::Version {
                workspace_id,
                object_id,
                version,
            } => {
                let ver = self
                    .versions
                    .get_mut(&(*workspace_id, *object_id, *version))
                    .ok_or_else(|| {
                        StoreError::MissingRecord(format!(
                            "object version {workspace_id}/{object_id}/{version}"
                        ))
                    })?;
                // version targets never bump a modification date
                Ok((&mut ver.admin_metadata, None))
            }
        }
    }
}

/// [`RecordStore`] holding all records in process memory.
pub struct InMemoryRecordStore {
    state: RwLock<State>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    /// Number of workspace records, clone targets included.
    pub fn workspace_count(&self) -> usize {
        self.state.read().expect("lock poisoned").workspaces.len()
    }

    /// Number of object container records, deleted included.
    pub fn object_count(&self) -> usize {
        self.state.read().expect("lock poisoned").objects.len()
    }

    /// Number of version records.
    pub fn version_count(&self) -> usize {
        self.state.read().expect("lock poisoned").versions.len()
    }

    /// Drop every record and reset the workspace id counter.
    pub fn clear(&self) {
        let mut state = self.state.write().expect("lock poisoned");
        *state = State::default();
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryRecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read().expect("lock poisoned");
        f.debug_struct("InMemoryRecordStore")
            .field("workspaces", &state.workspaces.len())
            .field("objects", &state.objects.len())
            .field("versions", &state.versions.len())
            .field("acls", &state.acls.len())
            .field("provenance", &state.provenance.len())
            .finish()
    }
}

impl RecordStore for InMemoryRecordStore {
    // ------------------------------------------------------------------
    // Workspaces
    // ------------------------------------------------------------------

    fn next_workspace_id(&self) -> StoreResult<u64> {
        let mut state = self.state.write().expect("lock poisoned");
        state.workspace_counter += 1;
        Ok(state.workspace_counter)
    }

    fn insert_workspace(&self, record: WorkspaceRecord) -> StoreResult<()> {
        let mut guard = self.state.write().expect("lock poisoned");
        let state = &mut *guard;
        if state.workspaces.contains_key(&record.id) {
            return Err(StoreError::Corrupt(format!(
                "workspace id {} inserted twice",
                record.id
            )));
        }
        if let Some(name) = &record.name {
            if state.workspace_names.contains_key(name) {
                return Err(StoreError::DuplicateWorkspaceName { name: name.clone() });
            }
            state.workspace_names.insert(name.clone(), record.id);
        }
        state.workspaces.insert(record.id, record);
        Ok(())
    }

    fn get_workspace_by_id(&self, workspace_id: u64) -> StoreResult<Option<WorkspaceRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.workspaces.get(&workspace_id).cloned())
    }

    fn get_workspace_by_name(&self, name: &str) -> StoreResult<Option<WorkspaceRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .workspace_names
            .get(name)
            .and_then(|id| state.workspaces.get(id))
            .cloned())
    }

    fn increment_object_counter(&self, workspace_id: u64, n: u64) -> StoreResult<u64> {
        let mut state = self.state.write().expect("lock poisoned");
        let ws = state
            .workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| StoreError::MissingRecord(format!("workspace {workspace_id}")))?;
        ws.max_object_id += n;
        Ok(ws.max_object_id)
    }

    fn touch_workspace(&self, workspace_id: u64, moddate: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let ws = state
            .workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| StoreError::MissingRecord(format!("workspace {workspace_id}")))?;
        ws.moddate = truncate_to_millis(moddate);
        Ok(())
    }

    fn rename_workspace(
        &self,
        workspace_id: u64,
        new_name: &str,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut guard = self.state.write().expect("lock poisoned");
        let state = &mut *guard;
        if let Some(&holder) = state.workspace_names.get(new_name) {
            if holder != workspace_id {
                return Err(StoreError::DuplicateWorkspaceName {
                    name: new_name.to_string(),
                });
            }
        }
        let ws = state
            .workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| StoreError::MissingRecord(format!("workspace {workspace_id}")))?;
        let old_name = ws.name.replace(new_name.to_string());
        ws.moddate = truncate_to_millis(moddate);
        if let Some(old) = old_name {
            state.workspace_names.remove(&old);
        }
        state
            .workspace_names
            .insert(new_name.to_string(), workspace_id);
        Ok(())
    }

    fn finalize_clone(
        &self,
        workspace_id: u64,
        name: &str,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut guard = self.state.write().expect("lock poisoned");
        let state = &mut *guard;
        if state.workspace_names.contains_key(name) {
            return Err(StoreError::DuplicateWorkspaceName {
                name: name.to_string(),
            });
        }
        let ws = state
            .workspaces
            .get_mut(&workspace_id)
            .filter(|ws| ws.name.is_none())
            .ok_or_else(|| {
                StoreError::MissingRecord(format!("cloning workspace {workspace_id}"))
            })?;
        ws.name = Some(name.to_string());
        ws.moddate = truncate_to_millis(moddate);
        state.workspace_names.insert(name.to_string(), workspace_id);
        Ok(())
    }

    fn set_workspace_deleted(
        &self,
        workspace_id: u64,
        deleted: bool,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let ws = state
            .workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| StoreError::MissingRecord(format!("workspace {workspace_id}")))?;
        ws.deleted = deleted;
        ws.moddate = truncate_to_millis(moddate);
        Ok(())
    }

    fn lock_workspace(&self, workspace_id: u64) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let ws = state
            .workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| StoreError::MissingRecord(format!("workspace {workspace_id}")))?;
        ws.locked = true;
        Ok(())
    }

    fn set_workspace_description(
        &self,
        workspace_id: u64,
        description: Option<String>,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let ws = state
            .workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| StoreError::MissingRecord(format!("workspace {workspace_id}")))?;
        ws.description = description;
        ws.moddate = truncate_to_millis(moddate);
        Ok(())
    }

    fn set_workspace_owner(
        &self,
        workspace_id: u64,
        new_owner: &str,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let ws = state
            .workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| StoreError::MissingRecord(format!("workspace {workspace_id}")))?;
        ws.owner = new_owner.to_string();
        ws.moddate = truncate_to_millis(moddate);
        Ok(())
    }

    // ------------------------------------------------------------------
    // User metadata
    // ------------------------------------------------------------------

    fn set_metadata_key_if_present(
        &self,
        target: &MetadataTarget,
        key: &str,
        value: &str,
        moddate: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut guard = self.state.write().expect("lock poisoned");
        let (meta, moddate_slot) = guard.metadata_mut(target)?;
        if !meta.contains_key(key) {
            return Ok(false);
        }
        meta.set_unchecked(key, value);
        if let Some(slot) = moddate_slot {
            *slot = truncate_to_millis(moddate);
        }
        Ok(true)
    }

    fn add_metadata_key_if_absent(
        &self,
        target: &MetadataTarget,
        key: &str,
        value: &str,
        moddate: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut guard = self.state.write().expect("lock poisoned");
        let (meta, moddate_slot) = guard.metadata_mut(target)?;
        if meta.contains_key(key) {
            return Ok(false);
        }
        meta.set_unchecked(key, value);
        if let Some(slot) = moddate_slot {
            *slot = truncate_to_millis(moddate);
        }
        Ok(true)
    }

    fn remove_metadata_key(
        &self,
        target: &MetadataTarget,
        key: &str,
        moddate: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut guard = self.state.write().expect("lock poisoned");
        let (meta, moddate_slot) = guard.metadata_mut(target)?;
        if meta.remove(key).is_none() {
            return Ok(false);
        }
        if let Some(slot) = moddate_slot {
            *slot = truncate_to_millis(moddate);
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Access control
    // ------------------------------------------------------------------

    fn get_acl(&self, workspace_id: u64, user: &str) -> StoreResult<Option<Permission>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.acls.get(&(workspace_id, user.to_string())).copied())
    }

    fn get_acls_for_user(&self, user: &str) -> StoreResult<Vec<AclRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .acls
            .iter()
            .filter(|((_, u), _)| u == user)
            .map(|((wsid, u), perm)| AclRecord {
                workspace_id: *wsid,
                user: u.clone(),
                permission: *perm,
            })
            .collect())
    }

    fn get_user_acls_for_workspaces(
        &self,
        user: &str,
        workspace_ids: &[u64],
    ) -> StoreResult<Vec<AclRecord>> {
        let state = self.state.read().expect("lock poisoned");
        let mut found = Vec::new();
        for wsid in workspace_ids {
            if let Some(perm) = state.acls.get(&(*wsid, user.to_string())) {
                found.push(AclRecord {
                    workspace_id: *wsid,
                    user: user.to_string(),
                    permission: *perm,
                });
            }
        }
        Ok(found)
    }

    fn get_all_acls_for_workspace(&self, workspace_id: u64) -> StoreResult<Vec<AclRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .acls
            .range((workspace_id, String::new())..)
            .take_while(|((wsid, _), _)| *wsid == workspace_id)
            .map(|((wsid, user), perm)| AclRecord {
                workspace_id: *wsid,
                user: user.clone(),
                permission: *perm,
            })
            .collect())
    }

    fn set_acl(&self, workspace_id: u64, user: &str, permission: Permission) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state
            .acls
            .insert((workspace_id, user.to_string()), permission);
        Ok(())
    }

    fn remove_acl(&self, workspace_id: u64, user: &str) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state.acls.remove(&(workspace_id, user.to_string()));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    fn insert_object(&self, record: ObjectRecord) -> StoreResult<()> {
        let mut guard = self.state.write().expect("lock poisoned");
        let state = &mut *guard;
        let key = (record.workspace_id, record.id);
        if state.objects.contains_key(&key) {
            return Err(StoreError::Corrupt(format!(
                "object id {}/{} inserted twice",
                record.workspace_id, record.id
            )));
        }
        if !record.deleted {
            let name_key = (record.workspace_id, record.name.clone());
            if state.live_object_names.contains_key(&name_key) {
                return Err(StoreError::DuplicateObjectName {
                    wsid: record.workspace_id,
                    name: record.name.clone(),
                });
            }
            state.live_object_names.insert(name_key, record.id);
        }
        state.objects.insert(key, record);
        Ok(())
    }

    fn get_object(&self, workspace_id: u64, object_id: u64) -> StoreResult<Option<ObjectRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.objects.get(&(workspace_id, object_id)).cloned())
    }

    fn get_object_by_live_name(
        &self,
        workspace_id: u64,
        name: &str,
    ) -> StoreResult<Option<ObjectRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .live_object_names
            .get(&(workspace_id, name.to_string()))
            .and_then(|id| state.objects.get(&(workspace_id, *id)))
            .cloned())
    }

    fn list_objects_in_workspace(&self, workspace_id: u64) -> StoreResult<Vec<ObjectRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .objects
            .range((workspace_id, 0)..=(workspace_id, u64::MAX))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    fn append_versions(
        &self,
        workspace_id: u64,
        object_id: u64,
        n: u32,
        set_hidden: Option<bool>,
        moddate: DateTime<Utc>,
    ) -> StoreResult<Option<u32>> {
        let mut state = self.state.write().expect("lock poisoned");
        let Some(obj) = state.objects.get_mut(&(workspace_id, object_id)) else {
            warn!(workspace_id, object_id, "version append on absent object");
            return Ok(None);
        };
        obj.version_count += n;
        obj.refcounts.resize(obj.version_count as usize, 0);
        obj.moddate = truncate_to_millis(moddate);
        if let Some(hidden) = set_hidden {
            obj.hidden = hidden;
        }
        Ok(Some(obj.version_count))
    }

    fn set_object_deleted(
        &self,
        workspace_id: u64,
        object_id: u64,
        deleted: bool,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut guard = self.state.write().expect("lock poisoned");
        let state = &mut *guard;
        let obj = state
            .objects
            .get_mut(&(workspace_id, object_id))
            .ok_or_else(|| {
                StoreError::MissingRecord(format!("object {workspace_id}/{object_id}"))
            })?;
        if obj.deleted != deleted {
            let name_key = (workspace_id, obj.name.clone());
            if deleted {
                state.live_object_names.remove(&name_key);
            } else {
                if state.live_object_names.contains_key(&name_key) {
                    return Err(StoreError::DuplicateObjectName {
                        wsid: workspace_id,
                        name: obj.name.clone(),
                    });
                }
                state.live_object_names.insert(name_key, object_id);
            }
        }
        obj.deleted = deleted;
        obj.moddate = truncate_to_millis(moddate);
        Ok(())
    }

    fn set_object_hidden(
        &self,
        workspace_id: u64,
        object_id: u64,
        hidden: bool,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let obj = state
            .objects
            .get_mut(&(workspace_id, object_id))
            .ok_or_else(|| {
                StoreError::MissingRecord(format!("object {workspace_id}/{object_id}"))
            })?;
        obj.hidden = hidden;
        obj.moddate = truncate_to_millis(moddate);
        Ok(())
    }

    fn rename_object(
        &self,
        workspace_id: u64,
        object_id: u64,
        new_name: &str,
        moddate: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut guard = self.state.write().expect("lock poisoned");
        let state = &mut *guard;
        let obj = state
            .objects
            .get_mut(&(workspace_id, object_id))
            .ok_or_else(|| {
                StoreError::MissingRecord(format!("object {workspace_id}/{object_id}"))
            })?;
        if !obj.deleted {
            let new_key = (workspace_id, new_name.to_string());
            if let Some(&holder) = state.live_object_names.get(&new_key) {
                if holder != object_id {
                    return Err(StoreError::DuplicateObjectName {
                        wsid: workspace_id,
                        name: new_name.to_string(),
                    });
                }
            }
            state
                .live_object_names
                .remove(&(workspace_id, obj.name.clone()));
            state.live_object_names.insert(new_key, object_id);
        }
        obj.name = new_name.to_string();
        obj.moddate = truncate_to_millis(moddate);
        Ok(())
    }

    fn bulk_increment_refcounts(
        &self,
        version: u32,
        amount: u64,
        targets: &[(u64, Vec<u64>)],
    ) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let index = (version as usize).saturating_sub(1);
        for (workspace_id, object_ids) in targets {
            for object_id in object_ids {
                match state.objects.get_mut(&(*workspace_id, *object_id)) {
                    Some(obj) if index < obj.refcounts.len() => {
                        obj.refcounts[index] += amount;
                    }
                    Some(_) => {
                        warn!(
                            workspace_id,
                            object_id, version, "refcount target version not visible, skipped"
                        );
                    }
                    None => {
                        warn!(
                            workspace_id,
                            object_id, version, "refcount target object absent, skipped"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Versions
    // ------------------------------------------------------------------

    fn insert_versions(&self, records: Vec<VersionRecord>) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        for rec in &records {
            let key = (rec.workspace_id, rec.object_id, rec.version);
            if state.versions.contains_key(&key) {
                return Err(StoreError::Corrupt(format!(
                    "version {}/{}/{} inserted twice",
                    rec.workspace_id, rec.object_id, rec.version
                )));
            }
        }
        for rec in records {
            state
                .versions
                .insert((rec.workspace_id, rec.object_id, rec.version), rec);
        }
        Ok(())
    }

    fn get_version(
        &self,
        workspace_id: u64,
        object_id: u64,
        version: u32,
    ) -> StoreResult<Option<VersionRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .versions
            .get(&(workspace_id, object_id, version))
            .cloned())
    }

    fn list_versions_for_object(
        &self,
        workspace_id: u64,
        object_id: u64,
    ) -> StoreResult<Vec<VersionRecord>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state
            .versions
            .range((workspace_id, object_id, 0)..=(workspace_id, object_id, u32::MAX))
            .map(|(_, ver)| ver.clone())
            .collect())
    }

    fn find_versions(
        &self,
        filter: &VersionFilter,
        sorted: bool,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<VersionRecord>> {
        if filter.workspaces.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state.read().expect("lock poisoned");
        let wanted: HashSet<u64> = filter.workspaces.iter().copied().collect();
        let mut matches: Vec<&VersionRecord> = state
            .versions
            .values()
            .filter(|ver| {
                wanted.contains(&ver.workspace_id)
                    && filter.min_object_id.map_or(true, |min| ver.object_id >= min)
                    && filter.max_object_id.map_or(true, |max| ver.object_id <= max)
                    && filter
                        .object_type
                        .as_ref()
                        .map_or(true, |ty| ty.matches(&ver.object_type))
                    && (filter.savers.is_empty()
                        || filter.savers.iter().any(|s| *s == ver.saved_by))
                    && filter
                        .metadata
                        .iter()
                        .all(|(k, v)| ver.metadata.get(k) == Some(v.as_str()))
                    && filter.saved_after.map_or(true, |after| ver.saved > after)
                    && filter.saved_before.map_or(true, |before| ver.saved < before)
            })
            .collect();
        if sorted {
            matches.sort_by(|a, b| {
                (a.workspace_id, a.object_id)
                    .cmp(&(b.workspace_id, b.object_id))
                    .then(b.version.cmp(&a.version))
            });
        }
        Ok(matches.into_iter().skip(skip).take(limit).cloned().collect())
    }

    // ------------------------------------------------------------------
    // Provenance
    // ------------------------------------------------------------------

    fn insert_provenance(&self, records: Vec<Provenance>) -> StoreResult<Vec<Uuid>> {
        let mut state = self.state.write().expect("lock poisoned");
        let mut ids = Vec::with_capacity(records.len());
        for prov in records {
            let id = Uuid::now_v7();
            state.provenance.insert(id, prov);
            ids.push(id);
        }
        Ok(ids)
    }

    fn get_provenance(&self, ids: &[Uuid]) -> StoreResult<Vec<Option<Provenance>>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(ids.iter().map(|id| state.provenance.get(id).cloned()).collect())
    }

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    fn status(&self) -> DependencyStatus {
        DependencyStatus::up("InMemoryRecordStore", env!("CARGO_PKG_VERSION"))
    }
}
