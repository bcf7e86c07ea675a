//! Identifier resolution.
//!
//! Turns caller-supplied workspace and object selectors into validated
//! records with both identifying forms filled in. Resolution is where
//! deleted and missing records become typed errors, so every other
//! method group funnels through here before touching records.

use std::collections::HashMap;

use strata_blobs::BlobStore;
use strata_store::{ObjectRecord, RecordStore, WorkspaceRecord};
use strata_types::{ObjectIdOrName, ObjectIdentifier, WorkspaceIdentifier};

use crate::engine::WorkspaceEngine;
use crate::error::{EngineError, EngineResult};

/// A workspace selector validated against the store, with both the
/// numeric id and the current name filled in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedWorkspace {
    pub id: u64,
    pub name: String,
    pub locked: bool,
    pub deleted: bool,
}

impl ResolvedWorkspace {
    pub(crate) fn from_record(rec: &WorkspaceRecord) -> EngineResult<Self> {
        // nameless records are mid-clone and invisible to lookups; one
        // escaping the store layer is an invariant violation
        let name = rec
            .name
            .clone()
            .ok_or_else(|| EngineError::Corrupt(format!("workspace {} has no name", rec.id)))?;
        Ok(Self {
            id: rec.id,
            name,
            locked: rec.locked,
            deleted: rec.deleted,
        })
    }
}

/// An object selector validated against the store: numeric id, current
/// name, and the version the caller addressed.
///
/// `version` is the explicitly requested version, or the object's
/// version count when the caller left it out. A count of zero resolves
/// to version zero; the version fetch reports it missing, which keeps
/// "counter incremented, version record not yet visible" races readable
/// as not-found instead of corruption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedObject {
    pub workspace_id: u64,
    pub object_id: u64,
    pub name: String,
    pub version: u32,
    pub deleted: bool,
}

/// How object resolution treats deleted and missing records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolveFlags {
    /// Raise [`DeletedObject`](EngineError::DeletedObject) for records
    /// flagged deleted.
    pub(crate) except_if_deleted: bool,
    /// Resolve deleted records instead of omitting them. Moot when
    /// `except_if_deleted` is set.
    pub(crate) include_deleted: bool,
    /// Raise [`NoSuchObject`](EngineError::NoSuchObject) for missing
    /// records and versions instead of omitting them.
    pub(crate) except_if_missing: bool,
}

impl ResolveFlags {
    /// Deleted and missing records both raise. The default for
    /// single-object operations.
    pub fn strict() -> Self {
        Self {
            except_if_deleted: true,
            include_deleted: true,
            except_if_missing: true,
        }
    }

    /// Nothing raises: deleted records resolve, missing ones are
    /// omitted.
    pub fn tolerant() -> Self {
        Self {
            except_if_deleted: false,
            include_deleted: true,
            except_if_missing: false,
        }
    }

    /// Deleted records resolve, missing ones raise. For undeletion,
    /// which must address records the strict mode refuses.
    pub fn allow_deleted() -> Self {
        Self {
            except_if_deleted: false,
            include_deleted: true,
            except_if_missing: true,
        }
    }

    /// Deleted and missing records are both silently omitted.
    pub fn live_only() -> Self {
        Self {
            except_if_deleted: false,
            include_deleted: false,
            except_if_missing: false,
        }
    }
}

/// `name foo` or `id 7`, for not-found messages.
fn workspace_error_id(wsi: &WorkspaceIdentifier) -> String {
    match wsi {
        WorkspaceIdentifier::Id(id) => format!("id {id}"),
        WorkspaceIdentifier::Name(name) => format!("name {name}"),
    }
}

impl<S: RecordStore, B: BlobStore> WorkspaceEngine<S, B> {
    // ---- Workspace resolution ----

    /// Resolve a workspace selector. Missing and deleted workspaces
    /// both raise.
    pub fn resolve_workspace(&self, wsi: &WorkspaceIdentifier) -> EngineResult<ResolvedWorkspace> {
        self.resolve_workspace_inner(wsi, false)
    }

    /// Resolution that accepts deleted workspaces, for undeletion and
    /// administrative inspection.
    pub(crate) fn resolve_workspace_allow_deleted(
        &self,
        wsi: &WorkspaceIdentifier,
    ) -> EngineResult<ResolvedWorkspace> {
        self.resolve_workspace_inner(wsi, true)
    }

    fn resolve_workspace_inner(
        &self,
        wsi: &WorkspaceIdentifier,
        allow_deleted: bool,
    ) -> EngineResult<ResolvedWorkspace> {
        let rec = match wsi {
            WorkspaceIdentifier::Id(id) => self.store.get_workspace_by_id(*id)?,
            WorkspaceIdentifier::Name(name) => self.store.get_workspace_by_name(name)?,
        };
        let rec =
            rec.ok_or_else(|| EngineError::NoSuchWorkspace(workspace_error_id(wsi)))?;
        if rec.deleted && !allow_deleted {
            return Err(EngineError::WorkspaceDeleted(wsi.to_string()));
        }
        ResolvedWorkspace::from_record(&rec)
    }

    // ---- Object resolution ----

    /// Resolve an object selector. Missing objects and versions raise
    /// `NoSuchObject`; deleted objects raise `DeletedObject`.
    pub fn resolve_object(&self, oi: &ObjectIdentifier) -> EngineResult<ResolvedObject> {
        let ws = self.resolve_workspace(oi.workspace())?;
        let res =
            self.resolve_object_in_workspace(&ws, oi.object(), oi.version(), ResolveFlags::strict())?;
        res.ok_or_else(|| {
            // strict mode returns every miss as an error above; an empty
            // success slot cannot happen
            EngineError::Corrupt(format!("strict resolution of {oi} produced no record"))
        })
    }

    /// Resolve a batch of object selectors, one output slot per input.
    ///
    /// Workspace lookup failures follow the object flags: a missing or
    /// deleted workspace empties the slot unless `except_if_missing` is
    /// set, in which case it raises.
    pub(crate) fn resolve_objects(
        &self,
        ids: &[ObjectIdentifier],
        flags: ResolveFlags,
    ) -> EngineResult<Vec<Option<ResolvedObject>>> {
        let mut workspaces: HashMap<WorkspaceIdentifier, Option<ResolvedWorkspace>> =
            HashMap::new();
        let mut out = Vec::with_capacity(ids.len());
        for oi in ids {
            let ws = match workspaces.get(oi.workspace()) {
                Some(cached) => cached.clone(),
                None => {
                    let resolved = match self.resolve_workspace(oi.workspace()) {
                        Ok(ws) => Some(ws),
                        Err(
                            EngineError::NoSuchWorkspace(_) | EngineError::WorkspaceDeleted(_),
                        ) if !flags.except_if_missing => None,
                        Err(err) => return Err(err),
                    };
                    workspaces.insert(oi.workspace().clone(), resolved.clone());
                    resolved
                }
            };
            match ws {
                Some(ws) => out.push(self.resolve_object_in_workspace(
                    &ws,
                    oi.object(),
                    oi.version(),
                    flags,
                )?),
                None => out.push(None),
            }
        }
        Ok(out)
    }

    /// Resolve one object selector inside an already resolved workspace.
    ///
    /// Name lookups consult the live name index first. On a miss the
    /// deleted objects of the workspace are scanned for the name, taking
    /// the highest object id when several deleted objects held it; names
    /// are unique among live objects only, so deleted holders can
    /// accumulate. The fallback keeps deleted objects addressable by
    /// name for reads while leaving the name free for reuse.
    pub(crate) fn resolve_object_in_workspace(
        &self,
        ws: &ResolvedWorkspace,
        obj: &ObjectIdOrName,
        version: Option<u32>,
        flags: ResolveFlags,
    ) -> EngineResult<Option<ResolvedObject>> {
        let rec = match obj {
            ObjectIdOrName::Id(id) => self.store.get_object(ws.id, *id)?,
            ObjectIdOrName::Name(name) => {
                let live = self.store.get_object_by_live_name(ws.id, name)?;
                if live.is_some() {
                    live
                } else if flags.except_if_deleted || flags.include_deleted {
                    self.find_deleted_by_name(ws.id, name)?
                } else {
                    None
                }
            }
        };
        let rec = match rec {
            Some(rec) => rec,
            None if flags.except_if_missing => {
                let kind = match obj {
                    ObjectIdOrName::Id(_) => "id",
                    ObjectIdOrName::Name(_) => "name",
                };
                return Err(EngineError::NoSuchObject(format!(
                    "No object with {kind} {obj} exists in workspace {} (name {})",
                    ws.id, ws.name
                )));
            }
            None => return Ok(None),
        };
        if rec.deleted {
            if flags.except_if_deleted {
                return Err(EngineError::DeletedObject(format!(
                    "Object {} (name {}) in workspace {} (name {}) has been deleted",
                    rec.id, rec.name, ws.id, ws.name
                )));
            }
            if !flags.include_deleted {
                return Ok(None);
            }
        }
        let latest = rec.version_count;
        let version = version.unwrap_or(latest);
        if version > latest {
            if flags.except_if_missing {
                return Err(EngineError::NoSuchObject(format!(
                    "No object with id {} (name {}) and version {} exists in workspace {} (name {})",
                    rec.id, rec.name, version, ws.id, ws.name
                )));
            }
            return Ok(None);
        }
        Ok(Some(ResolvedObject {
            workspace_id: ws.id,
            object_id: rec.id,
            name: rec.name,
            version,
            deleted: rec.deleted,
        }))
    }

    /// Most recently assigned deleted object bearing `name`, if any.
    fn find_deleted_by_name(
        &self,
        workspace_id: u64,
        name: &str,
    ) -> EngineResult<Option<ObjectRecord>> {
        let mut found: Option<ObjectRecord> = None;
        for rec in self.store.list_objects_in_workspace(workspace_id)? {
            if rec.deleted && rec.name == name {
                found = Some(rec);
            }
        }
        // list order is ascending by id, so the last hit is the highest
        Ok(found)
    }

    /// The missing-version error for an object whose resolution
    /// succeeded but whose version record is gone or not yet visible.
    pub(crate) fn version_not_found(&self, res: &ResolvedObject, ws_name: &str) -> EngineError {
        EngineError::NoSuchObject(format!(
            "No object with id {} (name {}) and version {} exists in workspace {} (name {})",
            res.object_id, res.name, res.version, res.workspace_id, ws_name
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use strata_blobs::MemoryBlobStore;
    use strata_store::{InMemoryRecordStore, VersionRecord};
    use strata_types::{Checksum, ObjectType, UserMetadata};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn engine() -> WorkspaceEngine<InMemoryRecordStore, MemoryBlobStore> {
        WorkspaceEngine::new(InMemoryRecordStore::new(), MemoryBlobStore::new())
    }

    fn seed_workspace(eng: &WorkspaceEngine<InMemoryRecordStore, MemoryBlobStore>, name: &str) -> u64 {
        let id = eng.store().next_workspace_id().unwrap();
        eng.store()
            .insert_workspace(WorkspaceRecord::new(id, Some(name.to_string()), "alice", Utc::now()))
            .unwrap();
        id
    }

    fn seed_object(
        eng: &WorkspaceEngine<InMemoryRecordStore, MemoryBlobStore>,
        ws: u64,
        name: &str,
        versions: u32,
    ) -> u64 {
        let id = eng.store().increment_object_counter(ws, 1).unwrap();
        eng.store()
            .insert_object(ObjectRecord::new(ws, id, name, Utc::now()))
            .unwrap();
        if versions > 0 {
            let after = eng
                .store()
                .append_versions(ws, id, versions, None, Utc::now())
                .unwrap()
                .unwrap();
            let records = (after - versions + 1..=after)
                .map(|v| VersionRecord {
                    workspace_id: ws,
                    object_id: id,
                    version: v,
                    saved_by: "alice".to_string(),
                    saved: Utc::now(),
                    object_type: ObjectType::new("Test.Obj", 1, 0).unwrap(),
                    checksum: Checksum::from_bytes([7; 16]),
                    size: 2,
                    metadata: UserMetadata::empty(),
                    admin_metadata: UserMetadata::empty(),
                    refs: Vec::new(),
                    provenance_refs: Vec::new(),
                    provenance: Uuid::now_v7(),
                    copied: None,
                    reverted_from: None,
                    extracted_ids: BTreeMap::new(),
                })
                .collect();
            eng.store().insert_versions(records).unwrap();
        }
        id
    }

    fn by_name(ws: &str, obj: &str) -> ObjectIdentifier {
        ObjectIdentifier::new(
            WorkspaceIdentifier::from_name(ws).unwrap(),
            ObjectIdOrName::from_name(obj).unwrap(),
        )
    }

    fn by_id(ws: u64, obj: u64) -> ObjectIdentifier {
        ObjectIdentifier::new(
            WorkspaceIdentifier::from_id(ws).unwrap(),
            ObjectIdOrName::from_id(obj).unwrap(),
        )
    }

    // ---- Workspace resolution ----

    #[test]
    fn workspace_by_id_and_name_agree() {
        let eng = engine();
        let id = seed_workspace(&eng, "myws");
        let by_id = eng
            .resolve_workspace(&WorkspaceIdentifier::from_id(id).unwrap())
            .unwrap();
        let by_name = eng
            .resolve_workspace(&WorkspaceIdentifier::from_name("myws").unwrap())
            .unwrap();
        assert_eq!(by_id, by_name);
        assert_eq!(by_id.id, id);
        assert_eq!(by_id.name, "myws");
        assert!(!by_id.locked);
        assert!(!by_id.deleted);
    }

    #[test]
    fn missing_workspace_messages() {
        let eng = engine();
        let err = eng
            .resolve_workspace(&WorkspaceIdentifier::from_name("nope").unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "No workspace with name nope exists");
        let err = eng
            .resolve_workspace(&WorkspaceIdentifier::from_id(42).unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "No workspace with id 42 exists");
    }

    #[test]
    fn deleted_workspace_raises_unless_allowed() {
        let eng = engine();
        let id = seed_workspace(&eng, "gone");
        eng.store().set_workspace_deleted(id, true, Utc::now()).unwrap();
        let wsi = WorkspaceIdentifier::from_name("gone").unwrap();
        let err = eng.resolve_workspace(&wsi).unwrap_err();
        assert_eq!(err.to_string(), "Workspace gone is deleted");
        let ws = eng.resolve_workspace_allow_deleted(&wsi).unwrap();
        assert!(ws.deleted);
        assert_eq!(ws.id, id);
    }

    #[test]
    fn cloning_workspace_is_invisible() {
        let eng = engine();
        let id = eng.store().next_workspace_id().unwrap();
        eng.store()
            .insert_workspace(WorkspaceRecord::new(id, None, "alice", Utc::now()))
            .unwrap();
        let err = eng
            .resolve_workspace(&WorkspaceIdentifier::from_id(id).unwrap())
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSuchWorkspace(_)));
    }

    // ---- Object resolution ----

    #[test]
    fn object_by_id_and_name_agree() {
        let eng = engine();
        let ws = seed_workspace(&eng, "myws");
        let obj = seed_object(&eng, ws, "thing", 2);
        let a = eng.resolve_object(&by_name("myws", "thing")).unwrap();
        let b = eng.resolve_object(&by_id(ws, obj)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.object_id, obj);
        assert_eq!(a.name, "thing");
        assert_eq!(a.version, 2);
    }

    #[test]
    fn missing_object_messages() {
        let eng = engine();
        let ws = seed_workspace(&eng, "myws");
        let err = eng.resolve_object(&by_name("myws", "nothere")).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("No object with name nothere exists in workspace {ws} (name myws)")
        );
        let err = eng.resolve_object(&by_id(ws, 99)).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("No object with id 99 exists in workspace {ws} (name myws)")
        );
    }

    #[test]
    fn version_beyond_latest_is_missing() {
        let eng = engine();
        let ws = seed_workspace(&eng, "myws");
        let obj = seed_object(&eng, ws, "thing", 2);
        let oi = ObjectIdentifier::with_version(
            WorkspaceIdentifier::from_id(ws).unwrap(),
            ObjectIdOrName::from_id(obj).unwrap(),
            3,
        )
        .unwrap();
        let err = eng.resolve_object(&oi).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "No object with id {obj} (name thing) and version 3 exists in workspace {ws} (name myws)"
            )
        );
        // tolerant resolution omits instead
        let slots = eng.resolve_objects(&[oi], ResolveFlags::tolerant()).unwrap();
        assert_eq!(slots, vec![None]);
    }

    #[test]
    fn explicit_version_resolves() {
        let eng = engine();
        let ws = seed_workspace(&eng, "myws");
        let obj = seed_object(&eng, ws, "thing", 3);
        let oi = ObjectIdentifier::with_version(
            WorkspaceIdentifier::from_id(ws).unwrap(),
            ObjectIdOrName::from_id(obj).unwrap(),
            2,
        )
        .unwrap();
        let res = eng.resolve_object(&oi).unwrap();
        assert_eq!(res.version, 2);
    }

    #[test]
    fn deleted_object_raises_with_flag_and_resolves_without() {
        let eng = engine();
        let ws = seed_workspace(&eng, "myws");
        let obj = seed_object(&eng, ws, "thing", 1);
        eng.store().set_object_deleted(ws, obj, true, Utc::now()).unwrap();

        let err = eng.resolve_object(&by_name("myws", "thing")).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Object {obj} (name thing) in workspace {ws} (name myws) has been deleted")
        );

        // with the flag off the deleted record still resolves, by name
        // through the fallback scan and by id directly
        let slots = eng
            .resolve_objects(
                &[by_name("myws", "thing"), by_id(ws, obj)],
                ResolveFlags::tolerant(),
            )
            .unwrap();
        let a = slots[0].clone().unwrap();
        let b = slots[1].clone().unwrap();
        assert_eq!(a, b);
        assert!(a.deleted);
        assert_eq!(a.version, 1);

        // live-only resolution omits it
        let slots = eng
            .resolve_objects(&[by_id(ws, obj)], ResolveFlags::live_only())
            .unwrap();
        assert_eq!(slots, vec![None]);
    }

    #[test]
    fn deleted_name_is_free_for_a_new_object() {
        let eng = engine();
        let ws = seed_workspace(&eng, "myws");
        let old = seed_object(&eng, ws, "thing", 1);
        eng.store().set_object_deleted(ws, old, true, Utc::now()).unwrap();
        let new = seed_object(&eng, ws, "thing", 1);
        assert_ne!(old, new);

        // the live object wins the name; the deleted one stays reachable
        // by id
        let res = eng.resolve_object(&by_name("myws", "thing")).unwrap();
        assert_eq!(res.object_id, new);
        let res = eng.resolve_object(&by_id(ws, old));
        assert!(matches!(res, Err(EngineError::DeletedObject(_))));
    }

    #[test]
    fn name_fallback_takes_highest_deleted_id() {
        let eng = engine();
        let ws = seed_workspace(&eng, "myws");
        let first = seed_object(&eng, ws, "thing", 1);
        eng.store().set_object_deleted(ws, first, true, Utc::now()).unwrap();
        let second = seed_object(&eng, ws, "thing", 1);
        eng.store().set_object_deleted(ws, second, true, Utc::now()).unwrap();

        let slots = eng
            .resolve_objects(&[by_name("myws", "thing")], ResolveFlags::tolerant())
            .unwrap();
        assert_eq!(slots[0].as_ref().unwrap().object_id, second);
    }

    #[test]
    fn counter_ahead_of_version_records_resolves_to_zero() {
        let eng = engine();
        let ws = seed_workspace(&eng, "myws");
        let obj = seed_object(&eng, ws, "thing", 0);

        // no version requested: resolves with version 0, the caller's
        // version fetch reports not-found
        let res = eng.resolve_object(&by_id(ws, obj)).unwrap();
        assert_eq!(res.version, 0);

        // an explicit version is already known missing at resolve time
        let oi = ObjectIdentifier::with_version(
            WorkspaceIdentifier::from_id(ws).unwrap(),
            ObjectIdOrName::from_id(obj).unwrap(),
            1,
        )
        .unwrap();
        assert!(matches!(
            eng.resolve_object(&oi),
            Err(EngineError::NoSuchObject(_))
        ));
    }

    #[test]
    fn batch_tolerates_missing_workspace() {
        let eng = engine();
        seed_workspace(&eng, "real");
        let slots = eng
            .resolve_objects(
                &[by_name("ghost", "x"), by_name("real", "x")],
                ResolveFlags::tolerant(),
            )
            .unwrap();
        assert_eq!(slots, vec![None, None]);

        // strict batches still raise on the workspace
        let err = eng
            .resolve_objects(&[by_name("ghost", "x")], ResolveFlags::strict())
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSuchWorkspace(_)));
    }
}
