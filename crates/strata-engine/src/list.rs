//! Listing objects across every workspace a caller can read.
//!
//! A listing runs over a whole [`PermissionSet`] rather than a single
//! workspace: the store scans version records for all workspaces in the
//! set at once and the engine walks that scan in pages, checking each
//! row against its object record's hidden, deleted and latest-version
//! state before turning it into an [`ObjectInformation`]. Rows are
//! produced in scan order, so sorted scans yield workspace-then-object
//! ascending with versions newest first.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use strata_blobs::BlobStore;
use strata_store::{ObjectRecord, RecordStore, TypeFilter, VersionFilter, VersionRecord};
use strata_types::{ObjectInformation, Permission, PermissionSet};
use tracing::debug;

use crate::engine::WorkspaceEngine;
use crate::error::EngineResult;
use crate::read::version_info;
use crate::resolver::ResolvedWorkspace;

/// Hard cap on the number of rows a single listing returns.
pub const MAX_LISTED_OBJECTS: usize = 10_000;

/// Scan batches never shrink below this size, since visibility checks
/// discard rows after the fetch.
const MIN_QUERY_SIZE: usize = 100;

/// Filters and switches for [`WorkspaceEngine::list_objects`].
///
/// The default lists the latest version of every live, non-hidden
/// object in the permission set, up to [`MAX_LISTED_OBJECTS`] rows.
#[derive(Clone, Debug, Default)]
pub struct ListObjectsParams {
    /// Restrict to one type name, optionally pinned to a major or an
    /// exact major.minor version.
    pub object_type: Option<TypeFilter>,
    /// Restrict to versions saved by any of these users.
    pub savers: Vec<String>,
    /// Restrict to versions whose user metadata contains all of these
    /// key/value pairs.
    pub metadata: Vec<(String, String)>,
    /// Exclusive lower bound on the save timestamp.
    pub saved_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the save timestamp.
    pub saved_before: Option<DateTime<Utc>>,
    /// Inclusive object id range, applied in every workspace scanned.
    pub min_object_id: Option<u64>,
    pub max_object_id: Option<u64>,
    /// Include hidden objects.
    pub show_hidden: bool,
    /// Include deleted objects. A deleted object is only visible with
    /// write permission on its workspace, or to an administrator.
    pub show_deleted: bool,
    /// List nothing but deleted objects, under the same permission rule
    /// as `show_deleted`.
    pub show_only_deleted: bool,
    /// List every version of each object, newest first, instead of only
    /// the latest.
    pub show_all_versions: bool,
    /// Fill in user metadata on the returned rows.
    pub include_metadata: bool,
    /// Skip the write-permission check on deleted objects.
    pub as_admin: bool,
    /// Result cap. Zero means [`MAX_LISTED_OBJECTS`]; larger values are
    /// clamped to it.
    pub limit: usize,
}

impl<S: RecordStore, B: BlobStore> WorkspaceEngine<S, B> {
    /// List objects in every workspace named by `perms`.
    ///
    /// Workspaces that are deleted or whose records are gone drop out
    /// of the listing silently even when the permission set still names
    /// them. The scan is ordered by (workspace, object, version
    /// descending) only while no filter beyond the object id range is
    /// active; that ordering rides the version index, and every other
    /// filter drops the scan to the store's stable unsorted order.
    pub fn list_objects(
        &self,
        perms: &PermissionSet,
        params: &ListObjectsParams,
    ) -> EngineResult<Vec<ObjectInformation>> {
        let ids: Vec<u64> = perms.workspaces().collect();
        let mut workspaces = HashMap::with_capacity(ids.len());
        for rec in self.store.get_workspaces_by_ids(&ids)? {
            // deleted and mid-clone workspaces stay invisible even when
            // an ACL row still points at them
            if rec.deleted || rec.name.is_none() {
                continue;
            }
            workspaces.insert(rec.id, ResolvedWorkspace::from_record(&rec)?);
        }
        if workspaces.is_empty() {
            return Ok(Vec::new());
        }

        let limit = match params.limit {
            0 => MAX_LISTED_OBJECTS,
            n => n.min(MAX_LISTED_OBJECTS),
        };
        let querysize = limit.max(MIN_QUERY_SIZE);

        let mut scanned: Vec<u64> = workspaces.keys().copied().collect();
        scanned.sort_unstable();
        let filter = VersionFilter {
            workspaces: scanned,
            min_object_id: params.min_object_id,
            max_object_id: params.max_object_id,
            object_type: params.object_type.clone(),
            savers: params.savers.clone(),
            metadata: params.metadata.clone(),
            saved_after: params.saved_after,
            saved_before: params.saved_before,
        };
        let sorted = filter.object_type.is_none()
            && filter.savers.is_empty()
            && filter.metadata.is_empty()
            && filter.saved_after.is_none()
            && filter.saved_before.is_none();
        debug!(
            workspaces = workspaces.len(),
            limit, sorted, "listing objects"
        );

        let mut out = Vec::new();
        let mut skip = 0;
        loop {
            let batch = self.store.find_versions(&filter, sorted, skip, querysize)?;
            if batch.is_empty() {
                break;
            }
            skip += batch.len();

            let mut keys: Vec<(u64, u64)> = batch
                .iter()
                .map(|v| (v.workspace_id, v.object_id))
                .collect();
            keys.sort_unstable();
            keys.dedup();
            let objects: HashMap<(u64, u64), ObjectRecord> = self
                .store
                .get_objects_by_keys(&keys)?
                .into_iter()
                .map(|rec| ((rec.workspace_id, rec.id), rec))
                .collect();

            for ver in &batch {
                let Some(obj) = objects.get(&(ver.workspace_id, ver.object_id)) else {
                    // a version row can briefly outlive its object record
                    continue;
                };
                if !listable(perms, params, obj, ver) {
                    continue;
                }
                let ws = &workspaces[&ver.workspace_id];
                out.push(version_info(ws, &obj.name, ver, params.include_metadata));
                if out.len() >= limit {
                    return Ok(out);
                }
            }
            if batch.len() < querysize {
                break;
            }
        }
        Ok(out)
    }
}

/// Visibility of one version row given its object record's flags.
///
/// Latest-only listings match the row's version number against the
/// object's version counter; an object whose counter ran ahead of its
/// version records lists nothing until the missing record lands.
fn listable(
    perms: &PermissionSet,
    params: &ListObjectsParams,
    obj: &ObjectRecord,
    ver: &VersionRecord,
) -> bool {
    if !params.show_all_versions && ver.version != obj.version_count {
        return false;
    }
    if obj.hidden && !params.show_hidden {
        return false;
    }
    let deleted_visible =
        params.as_admin || perms.user_permission(obj.workspace_id) >= Permission::Write;
    if params.show_only_deleted {
        return obj.deleted && deleted_visible;
    }
    !obj.deleted || (params.show_deleted && deleted_visible)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};
    use strata_blobs::MemoryBlobStore;
    use strata_store::InMemoryRecordStore;
    use strata_types::{
        Checksum, ObjectIdOrName, ObjectIdentifier, ObjectType, Provenance, UserMetadata,
        WorkspaceIdentifier,
    };
    use uuid::Uuid;

    use crate::save::SaveRequest;

    fn engine() -> WorkspaceEngine<InMemoryRecordStore, MemoryBlobStore> {
        WorkspaceEngine::new(InMemoryRecordStore::new(), MemoryBlobStore::new())
    }

    fn workspace(
        eng: &WorkspaceEngine<InMemoryRecordStore, MemoryBlobStore>,
        name: &str,
    ) -> WorkspaceIdentifier {
        eng.create_workspace("alice", name, false, None, UserMetadata::empty())
            .unwrap();
        WorkspaceIdentifier::from_name(name).unwrap()
    }

    fn request(name: &str, payload: &[u8]) -> SaveRequest {
        let mut sum = [0u8; 16];
        for (i, b) in payload.iter().chain(name.as_bytes()).enumerate() {
            sum[i % 16] ^= *b;
        }
        SaveRequest::new(
            ObjectIdOrName::from_name(name).unwrap(),
            ObjectType::new("Test.Obj", 1, 0).unwrap(),
            payload.to_vec(),
            Checksum::from_bytes(sum),
            Provenance::new("alice", Utc::now()),
        )
    }

    fn save(
        eng: &WorkspaceEngine<InMemoryRecordStore, MemoryBlobStore>,
        ws: &WorkspaceIdentifier,
        name: &str,
        payload: &[u8],
    ) {
        eng.save_objects(ws, "alice", vec![request(name, payload)])
            .unwrap();
    }

    fn ident(s: &str) -> ObjectIdentifier {
        ObjectIdentifier::parse(s).unwrap()
    }

    fn list(
        eng: &WorkspaceEngine<InMemoryRecordStore, MemoryBlobStore>,
        user: &str,
        params: &ListObjectsParams,
    ) -> Vec<ObjectInformation> {
        let perms = eng
            .accessible_workspaces(Some(user), Permission::Read, false)
            .unwrap();
        eng.list_objects(&perms, params).unwrap()
    }

    fn refs(infos: &[ObjectInformation]) -> Vec<String> {
        infos.iter().map(|i| i.reference().to_string()).collect()
    }

    fn version_record(wsid: u64, objid: u64, version: u32) -> VersionRecord {
        VersionRecord {
            workspace_id: wsid,
            object_id: objid,
            version,
            saved_by: "alice".to_string(),
            saved: Utc::now(),
            object_type: ObjectType::new("Test.Obj", 1, 0).unwrap(),
            checksum: Checksum::from_bytes([version as u8; 16]),
            size: 4,
            metadata: UserMetadata::empty(),
            admin_metadata: UserMetadata::empty(),
            refs: Vec::new(),
            provenance_refs: Vec::new(),
            provenance: Uuid::now_v7(),
            copied: None,
            reverted_from: None,
            extracted_ids: BTreeMap::new(),
        }
    }

    // ---- Scope and ordering ----

    #[test]
    fn lists_latest_versions_in_workspace_and_id_order() {
        let eng = engine();
        let one = workspace(&eng, "one");
        save(&eng, &one, "alpha", b"a1");
        save(&eng, &one, "alpha", b"a2");
        save(&eng, &one, "beta", b"b1");
        let two = workspace(&eng, "two");
        save(&eng, &two, "gamma", b"g1");

        let infos = list(&eng, "alice", &ListObjectsParams::default());
        assert_eq!(refs(&infos), ["1/1/2", "1/2/1", "2/1/1"]);
        assert_eq!(infos[0].name, "alpha");
        assert_eq!(infos[0].workspace_name, "one");
        assert_eq!(infos[2].workspace_name, "two");
        assert!(infos[0].metadata.is_none());
    }

    #[test]
    fn another_users_workspaces_stay_invisible() {
        let eng = engine();
        let mine = workspace(&eng, "mine");
        save(&eng, &mine, "obj", b"x");
        eng.create_workspace("bob", "theirs", false, None, UserMetadata::empty())
            .unwrap();
        let theirs = WorkspaceIdentifier::from_name("theirs").unwrap();
        eng.save_objects(&theirs, "bob", vec![request("obj", b"y")])
            .unwrap();

        let alice = list(&eng, "alice", &ListObjectsParams::default());
        assert_eq!(refs(&alice), ["1/1/1"]);
        let bob = list(&eng, "bob", &ListObjectsParams::default());
        assert_eq!(refs(&bob), ["2/1/1"]);
    }

    #[test]
    fn an_empty_permission_set_lists_nothing() {
        let eng = engine();
        let ws = workspace(&eng, "w");
        save(&eng, &ws, "obj", b"x");
        assert!(list(&eng, "nobody", &ListObjectsParams::default()).is_empty());
    }

    #[test]
    fn deleted_workspaces_drop_out_of_the_listing() {
        let eng = engine();
        let keep = workspace(&eng, "keep");
        save(&eng, &keep, "a", b"1");
        let trash = workspace(&eng, "trash");
        save(&eng, &trash, "b", b"2");
        eng.set_workspace_deleted(&trash, true).unwrap();

        let infos = list(&eng, "alice", &ListObjectsParams::default());
        assert_eq!(refs(&infos), ["1/1/1"]);
    }

    #[test]
    fn all_versions_are_listed_newest_first() {
        let eng = engine();
        let ws = workspace(&eng, "w");
        save(&eng, &ws, "alpha", b"v1");
        save(&eng, &ws, "alpha", b"v2");
        save(&eng, &ws, "alpha", b"v3");

        let latest = list(&eng, "alice", &ListObjectsParams::default());
        assert_eq!(refs(&latest), ["1/1/3"]);

        let params = ListObjectsParams {
            show_all_versions: true,
            ..Default::default()
        };
        let all = list(&eng, "alice", &params);
        assert_eq!(refs(&all), ["1/1/3", "1/1/2", "1/1/1"]);
    }

    // ---- Visibility ----

    #[test]
    fn hidden_objects_need_the_flag() {
        let eng = engine();
        let ws = workspace(&eng, "w");
        let mut ghost = request("ghost", b"x");
        ghost.hidden = true;
        eng.save_objects(&ws, "alice", vec![ghost]).unwrap();
        save(&eng, &ws, "plain", b"y");

        let infos = list(&eng, "alice", &ListObjectsParams::default());
        assert_eq!(refs(&infos), ["1/2/1"]);

        let params = ListObjectsParams {
            show_hidden: true,
            ..Default::default()
        };
        let infos = list(&eng, "alice", &params);
        assert_eq!(refs(&infos), ["1/1/1", "1/2/1"]);
    }

    #[test]
    fn deleted_objects_need_write_permission() {
        let eng = engine();
        let ws = workspace(&eng, "w");
        save(&eng, &ws, "gone", b"x");
        save(&eng, &ws, "kept", b"y");
        eng.set_objects_deleted(&[ident("w/gone")], true).unwrap();
        eng.set_permissions(&ws, &["bob".to_string()], Permission::Read)
            .unwrap();

        let plain = list(&eng, "alice", &ListObjectsParams::default());
        assert_eq!(refs(&plain), ["1/2/1"]);

        let params = ListObjectsParams {
            show_deleted: true,
            ..Default::default()
        };
        let owner = list(&eng, "alice", &params);
        assert_eq!(refs(&owner), ["1/1/1", "1/2/1"]);

        let reader = list(&eng, "bob", &params);
        assert_eq!(refs(&reader), ["1/2/1"]);

        let admin = ListObjectsParams {
            show_deleted: true,
            as_admin: true,
            ..Default::default()
        };
        let admin = list(&eng, "bob", &admin);
        assert_eq!(refs(&admin), ["1/1/1", "1/2/1"]);
    }

    #[test]
    fn only_deleted_flips_the_selection() {
        let eng = engine();
        let ws = workspace(&eng, "w");
        save(&eng, &ws, "gone", b"x");
        save(&eng, &ws, "kept", b"y");
        eng.set_objects_deleted(&[ident("w/gone")], true).unwrap();
        eng.set_permissions(&ws, &["bob".to_string()], Permission::Read)
            .unwrap();

        let params = ListObjectsParams {
            show_only_deleted: true,
            ..Default::default()
        };
        let owner = list(&eng, "alice", &params);
        assert_eq!(refs(&owner), ["1/1/1"]);
        assert!(list(&eng, "bob", &params).is_empty());
    }

    #[test]
    fn anonymous_readers_see_global_workspaces_without_deletions() {
        let eng = engine();
        let ws = workspace(&eng, "open");
        eng.set_global_permission(&ws, Permission::Read).unwrap();
        save(&eng, &ws, "thing", b"x");
        save(&eng, &ws, "gone", b"y");
        eng.set_objects_deleted(&[ident("open/gone")], true)
            .unwrap();

        let perms = eng
            .accessible_workspaces(None, Permission::Read, false)
            .unwrap();
        let infos = eng
            .list_objects(&perms, &ListObjectsParams::default())
            .unwrap();
        assert_eq!(refs(&infos), ["1/1/1"]);

        let params = ListObjectsParams {
            show_deleted: true,
            ..Default::default()
        };
        let infos = eng.list_objects(&perms, &params).unwrap();
        assert_eq!(refs(&infos), ["1/1/1"]);
    }

    #[test]
    fn a_version_counter_ahead_of_its_records_hides_the_latest() {
        let eng = engine();
        workspace(&eng, "w");
        let mut obj = ObjectRecord::new(1, 1, "racy", Utc::now());
        obj.version_count = 3;
        obj.refcounts = vec![0, 0, 0];
        eng.store().insert_object(obj).unwrap();
        eng.store()
            .insert_versions(vec![version_record(1, 1, 1), version_record(1, 1, 2)])
            .unwrap();

        assert!(list(&eng, "alice", &ListObjectsParams::default()).is_empty());

        let params = ListObjectsParams {
            show_all_versions: true,
            ..Default::default()
        };
        let infos = list(&eng, "alice", &params);
        assert_eq!(refs(&infos), ["1/1/2", "1/1/1"]);
    }

    // ---- Filters ----

    #[test]
    fn type_filters_match_name_and_version() {
        let eng = engine();
        let ws = workspace(&eng, "w");
        let mut g1 = request("g1", b"x");
        g1.object_type = ObjectType::new("Genome", 1, 0).unwrap();
        let mut g2 = request("g2", b"y");
        g2.object_type = ObjectType::new("Genome", 2, 0).unwrap();
        let mut r1 = request("r1", b"z");
        r1.object_type = ObjectType::new("Report", 1, 0).unwrap();
        eng.save_objects(&ws, "alice", vec![g1, g2, r1]).unwrap();

        let params = ListObjectsParams {
            object_type: Some(TypeFilter {
                name: "Genome".to_string(),
                major: None,
                minor: None,
            }),
            ..Default::default()
        };
        let mut names: Vec<String> = list(&eng, "alice", &params)
            .into_iter()
            .map(|i| i.name)
            .collect();
        names.sort();
        assert_eq!(names, ["g1", "g2"]);

        let params = ListObjectsParams {
            object_type: Some(TypeFilter {
                name: "Genome".to_string(),
                major: Some(2),
                minor: None,
            }),
            ..Default::default()
        };
        let infos = list(&eng, "alice", &params);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, "g2");
    }

    #[test]
    fn saver_filters_select_versions_not_objects() {
        let eng = engine();
        let ws = workspace(&eng, "w");
        save(&eng, &ws, "alpha", b"v1");
        eng.set_permissions(&ws, &["bob".to_string()], Permission::Write)
            .unwrap();
        eng.save_objects(&ws, "bob", vec![request("alpha", b"v2")])
            .unwrap();

        let bob = ListObjectsParams {
            savers: vec!["bob".to_string()],
            ..Default::default()
        };
        assert_eq!(refs(&list(&eng, "alice", &bob)), ["1/1/2"]);

        // version 1 is alice's, but it is not the latest version
        let alice = ListObjectsParams {
            savers: vec!["alice".to_string()],
            ..Default::default()
        };
        assert!(list(&eng, "alice", &alice).is_empty());

        let alice_all = ListObjectsParams {
            savers: vec!["alice".to_string()],
            show_all_versions: true,
            ..Default::default()
        };
        assert_eq!(refs(&list(&eng, "alice", &alice_all)), ["1/1/1"]);
    }

    #[test]
    fn metadata_filters_match_exact_pairs() {
        let eng = engine();
        let ws = workspace(&eng, "w");
        let mut tagged = request("tagged", b"x");
        tagged.metadata = [("colour".to_string(), "blue".to_string())]
            .into_iter()
            .collect();
        eng.save_objects(&ws, "alice", vec![tagged]).unwrap();
        save(&eng, &ws, "bare", b"y");

        let params = ListObjectsParams {
            metadata: vec![("colour".to_string(), "blue".to_string())],
            ..Default::default()
        };
        let infos = list(&eng, "alice", &params);
        assert_eq!(refs(&infos), ["1/1/1"]);

        let params = ListObjectsParams {
            metadata: vec![("colour".to_string(), "red".to_string())],
            ..Default::default()
        };
        assert!(list(&eng, "alice", &params).is_empty());
    }

    #[test]
    fn save_date_bounds_are_exclusive() {
        let eng = engine();
        let ws = workspace(&eng, "w");
        let info = eng
            .save_objects(&ws, "alice", vec![request("only", b"x")])
            .unwrap()
            .remove(0);

        let at = ListObjectsParams {
            saved_after: Some(info.saved),
            ..Default::default()
        };
        assert!(list(&eng, "alice", &at).is_empty());

        let before = ListObjectsParams {
            saved_after: Some(info.saved - Duration::milliseconds(1)),
            ..Default::default()
        };
        assert_eq!(refs(&list(&eng, "alice", &before)), ["1/1/1"]);

        let at = ListObjectsParams {
            saved_before: Some(info.saved),
            ..Default::default()
        };
        assert!(list(&eng, "alice", &at).is_empty());

        let after = ListObjectsParams {
            saved_before: Some(info.saved + Duration::milliseconds(1)),
            ..Default::default()
        };
        assert_eq!(refs(&list(&eng, "alice", &after)), ["1/1/1"]);
    }

    #[test]
    fn object_id_ranges_are_inclusive() {
        let eng = engine();
        let ws = workspace(&eng, "w");
        save(&eng, &ws, "a", b"1");
        save(&eng, &ws, "b", b"2");
        save(&eng, &ws, "c", b"3");

        let params = ListObjectsParams {
            min_object_id: Some(2),
            ..Default::default()
        };
        assert_eq!(refs(&list(&eng, "alice", &params)), ["1/2/1", "1/3/1"]);

        let params = ListObjectsParams {
            min_object_id: Some(2),
            max_object_id: Some(2),
            ..Default::default()
        };
        assert_eq!(refs(&list(&eng, "alice", &params)), ["1/2/1"]);
    }

    #[test]
    fn metadata_is_filled_only_on_request() {
        let eng = engine();
        let ws = workspace(&eng, "w");
        let mut tagged = request("tagged", b"x");
        tagged.metadata = [("colour".to_string(), "blue".to_string())]
            .into_iter()
            .collect();
        eng.save_objects(&ws, "alice", vec![tagged]).unwrap();

        let bare = list(&eng, "alice", &ListObjectsParams::default());
        assert!(bare[0].metadata.is_none());

        let params = ListObjectsParams {
            include_metadata: true,
            ..Default::default()
        };
        let full = list(&eng, "alice", &params);
        let meta = full[0].metadata.as_ref().unwrap();
        assert_eq!(meta.get("colour"), Some("blue"));
    }

    // ---- Paging ----

    #[test]
    fn limits_page_through_filtered_scans() {
        let eng = engine();
        let ws = workspace(&eng, "big");
        let requests: Vec<SaveRequest> = (0..120)
            .map(|i| {
                let mut req = request(&format!("o{i:03}"), b"x");
                req.hidden = i % 8 == 0;
                req
            })
            .collect();
        eng.save_objects(&ws, "alice", requests).unwrap();

        // 105 visible objects; a limit of 90 crosses the 100-row page
        let params = ListObjectsParams {
            limit: 90,
            ..Default::default()
        };
        let infos = list(&eng, "alice", &params);
        let want: Vec<u64> = (1..=120).filter(|id| id % 8 != 1).take(90).collect();
        assert_eq!(infos.len(), 90);
        let got: Vec<u64> = infos.iter().map(|i| i.object_id).collect();
        assert_eq!(got, want);

        let unlimited = list(&eng, "alice", &ListObjectsParams::default());
        assert_eq!(unlimited.len(), 105);
    }
}
