//! Copying, reverting and cloning.
//!
//! All three duplicate existing version records instead of accepting new
//! payloads: blobs are shared by checksum, provenance documents are
//! shared by id, and reference counts are incremented again so a target
//! counts every version pointing at it.

use std::collections::HashSet;

use strata_blobs::BlobStore;
use strata_store::{ObjectRecord, RecordStore, StoreError, VersionRecord};
use strata_types::{
    check_workspace_name, ObjectIdOrName, ObjectIdentifier, ObjectInformation, Permission,
    Reference, UserMetadata, WorkspaceIdentifier, WorkspaceInformation, WORLD_USER,
};
use tracing::info;

use crate::engine::WorkspaceEngine;
use crate::error::{EngineError, EngineResult};
use crate::read::version_info;
use crate::resolver::{ResolveFlags, ResolvedObject};

/// Where a copy lands: an object to append to, or a name to create.
enum CopyTarget {
    Existing(ResolvedObject),
    New(String),
}

impl<S: RecordStore, B: BlobStore> WorkspaceEngine<S, B> {
    // ---- Copy ----

    /// Copy a source object into `to`, returning the destination's new
    /// latest version.
    ///
    /// When `to` names nothing yet and `from` carries no version, the
    /// source's whole version history is copied in order; otherwise the
    /// single resolved source version becomes the destination's next
    /// version. Copied versions share the source's payload and
    /// provenance and are stamped with the copying user and a
    /// copied-from reference. Copying onto a deleted object restores
    /// it; a version on `to` is ignored.
    pub fn copy_object(
        &self,
        user: &str,
        from: &ObjectIdentifier,
        to: &ObjectIdentifier,
    ) -> EngineResult<ObjectInformation> {
        let src_ws = self.resolve_workspace(from.workspace())?;
        let src = self
            .resolve_object_in_workspace(
                &src_ws,
                from.object(),
                from.version(),
                ResolveFlags::strict(),
            )?
            .ok_or_else(|| {
                EngineError::Corrupt(format!("strict resolution of {from} produced no record"))
            })?;
        let dest_ws = self.resolve_workspace(to.workspace())?;
        let target = match self.resolve_object_in_workspace(
            &dest_ws,
            to.object(),
            None,
            ResolveFlags::tolerant(),
        )? {
            Some(res) => CopyTarget::Existing(res),
            None => match to.object() {
                ObjectIdOrName::Id(id) => {
                    return Err(EngineError::NoSuchObject(format!(
                        "Copy destination is specified as object id {id} in workspace {} \
                         which does not exist.",
                        dest_ws.id
                    )))
                }
                ObjectIdOrName::Name(name) => CopyTarget::New(name.clone()),
            },
        };

        let copy_all = matches!(target, CopyTarget::New(_)) && from.version().is_none();
        let versions: Vec<VersionRecord> = if copy_all {
            let keys: Vec<(u64, u64, u32)> = (1..=src.version)
                .map(|v| (src_ws.id, src.object_id, v))
                .collect();
            // gaps from interrupted saves are skipped, not copied
            self.store.get_versions(&keys)?.into_iter().flatten().collect()
        } else {
            match self.store.get_version(src_ws.id, src.object_id, src.version)? {
                Some(ver) => vec![ver],
                None => Vec::new(),
            }
        };
        if versions.is_empty() {
            return Err(self.version_not_found(&src, &src_ws.name));
        }

        self.increment_reference_counts(
            versions
                .iter()
                .flat_map(|v| v.refs.iter().chain(v.provenance_refs.iter()).copied()),
        )?;

        let now = Self::now();
        let (dest_id, dest_name) = match target {
            CopyTarget::Existing(res) => {
                if res.deleted {
                    self.store
                        .set_object_deleted(dest_ws.id, res.object_id, false, now)?;
                }
                (res.object_id, res.name)
            }
            CopyTarget::New(name) => {
                let next = self.store.increment_object_counter(dest_ws.id, 1)?;
                let id = self.claim_object_name(&dest_ws, &name, next, false, now)?;
                (id, name)
            }
        };

        let n = versions.len() as u32;
        let after = self
            .store
            .append_versions(dest_ws.id, dest_id, n, None, now)?
            .ok_or_else(|| {
                EngineError::Corrupt(format!(
                    "object {}/{dest_id} vanished during a copy",
                    dest_ws.id
                ))
            })?;
        let mut records = Vec::with_capacity(versions.len());
        let mut latest = None;
        for (offset, src_ver) in versions.into_iter().enumerate() {
            let copied = Reference::new(src_ws.id, src.object_id, src_ver.version)?;
            let ver = VersionRecord {
                workspace_id: dest_ws.id,
                object_id: dest_id,
                version: after - n + 1 + offset as u32,
                saved_by: user.to_string(),
                saved: now,
                copied: Some(copied),
                reverted_from: None,
                ..src_ver
            };
            latest = Some(version_info(&dest_ws, &dest_name, &ver, true));
            records.push(ver);
        }
        self.store.insert_versions(records)?;
        self.store.touch_workspace(dest_ws.id, now)?;
        info!(
            source = %from,
            workspace = dest_ws.id,
            object = dest_id,
            versions = n,
            user,
            "object copied"
        );
        // the emptiness check above means at least one info was built
        latest.ok_or_else(|| {
            EngineError::Corrupt(format!(
                "copy to {}/{dest_id} produced no versions",
                dest_ws.id
            ))
        })
    }

    // ---- Revert ----

    /// Append a new version duplicating the resolved source version,
    /// marked with the version it restores.
    ///
    /// History is never rewritten: the revert lands as the next version
    /// number, keeping the source's payload, lineage, and any
    /// copied-from marker.
    pub fn revert_object(
        &self,
        user: &str,
        oi: &ObjectIdentifier,
    ) -> EngineResult<ObjectInformation> {
        let ws = self.resolve_workspace(oi.workspace())?;
        let res = self
            .resolve_object_in_workspace(&ws, oi.object(), oi.version(), ResolveFlags::strict())?
            .ok_or_else(|| {
                EngineError::Corrupt(format!("strict resolution of {oi} produced no record"))
            })?;
        let src_ver = self
            .store
            .get_version(ws.id, res.object_id, res.version)?
            .ok_or_else(|| self.version_not_found(&res, &ws.name))?;

        self.increment_reference_counts(
            src_ver
                .refs
                .iter()
                .chain(src_ver.provenance_refs.iter())
                .copied(),
        )?;

        let now = Self::now();
        let after = self
            .store
            .append_versions(ws.id, res.object_id, 1, None, now)?
            .ok_or_else(|| {
                EngineError::Corrupt(format!(
                    "object {}/{} vanished during a revert",
                    ws.id, res.object_id
                ))
            })?;
        let ver = VersionRecord {
            version: after,
            saved_by: user.to_string(),
            saved: now,
            reverted_from: Some(res.version),
            ..src_ver
        };
        let info = version_info(&ws, &res.name, &ver, true);
        self.store.insert_versions(vec![ver])?;
        self.store.touch_workspace(ws.id, now)?;
        info!(
            workspace = ws.id,
            object = res.object_id,
            from = res.version,
            to = after,
            user,
            "object reverted"
        );
        Ok(info)
    }

    // ---- Clone ----

    /// Clone a workspace: every live, non-excluded object's full
    /// version history lands in a brand-new workspace under the same
    /// object ids.
    ///
    /// The target workspace is created nameless and stays invisible
    /// until every object has been copied; the final commit claims the
    /// name, making the clone appear fully formed. A name claimed by
    /// someone else between the up-front check and the commit fails the
    /// clone and leaves the nameless record behind, unreachable.
    #[allow(clippy::too_many_arguments)]
    pub fn clone_workspace(
        &self,
        user: &str,
        from: &WorkspaceIdentifier,
        new_name: &str,
        global_read: bool,
        description: Option<String>,
        metadata: UserMetadata,
        exclude: &[ObjectIdOrName],
    ) -> EngineResult<WorkspaceInformation> {
        check_workspace_name(new_name, Some(user))?;
        let source = self.resolve_workspace(from)?;
        // resolve exclusions before creating anything so bad input
        // cannot leave a half-made workspace behind
        let mut excluded = HashSet::with_capacity(exclude.len());
        for obj in exclude {
            let res = self
                .resolve_object_in_workspace(&source, obj, None, ResolveFlags::strict())?
                .ok_or_else(|| {
                    EngineError::Corrupt(format!("strict resolution of {obj} produced no record"))
                })?;
            excluded.insert(res.object_id);
        }
        let target = self.create_workspace_record(
            user,
            new_name,
            global_read,
            description,
            metadata,
            true,
        )?;

        let now = Self::now();
        let mut max_id = 0;
        let mut cloned = 0u64;
        for rec in self.store.list_objects_in_workspace(source.id)? {
            if rec.deleted || rec.version_count == 0 || excluded.contains(&rec.id) {
                continue;
            }
            // counted before the version fetch; a skipped object still
            // reserves its id in the clone
            max_id = max_id.max(rec.id);
            let keys: Vec<(u64, u64, u32)> = (1..=rec.version_count)
                .map(|v| (source.id, rec.id, v))
                .collect();
            let versions: Vec<VersionRecord> =
                self.store.get_versions(&keys)?.into_iter().flatten().collect();
            if versions.is_empty() {
                continue;
            }
            self.increment_reference_counts(
                versions
                    .iter()
                    .flat_map(|v| v.refs.iter().chain(v.provenance_refs.iter()).copied()),
            )?;
            self.store
                .insert_object(ObjectRecord::new(target.id, rec.id, &rec.name, now))?;
            let n = versions.len() as u32;
            let after = self
                .store
                .append_versions(target.id, rec.id, n, Some(rec.hidden), now)?
                .ok_or_else(|| {
                    EngineError::Corrupt(format!(
                        "object {}/{} vanished during a clone",
                        target.id, rec.id
                    ))
                })?;
            let mut records = Vec::with_capacity(versions.len());
            for (offset, src_ver) in versions.into_iter().enumerate() {
                let copied = Reference::new(source.id, rec.id, src_ver.version)?;
                records.push(VersionRecord {
                    workspace_id: target.id,
                    object_id: rec.id,
                    version: after - n + 1 + offset as u32,
                    saved_by: user.to_string(),
                    saved: now,
                    copied: Some(copied),
                    reverted_from: None,
                    ..src_ver
                });
            }
            self.store.insert_versions(records)?;
            cloned += 1;
        }
        if max_id > 0 {
            self.store.increment_object_counter(target.id, max_id)?;
        }

        let commit = Self::now();
        match self.store.finalize_clone(target.id, new_name, commit) {
            Err(StoreError::DuplicateWorkspaceName { name }) => {
                return Err(EngineError::PreExistingWorkspace(format!(
                    "Workspace name {name} is already in use"
                )));
            }
            Err(StoreError::MissingRecord(_)) => {
                return Err(EngineError::Corrupt(format!(
                    "cloning workspace {} disappeared before the name commit",
                    target.id
                )));
            }
            other => other?,
        }
        self.store.set_acl(target.id, user, Permission::Owner)?;
        if global_read {
            self.store.set_acl(target.id, WORLD_USER, Permission::Read)?;
        }
        info!(
            source = source.id,
            workspace = target.id,
            objects = cloned,
            user,
            "workspace cloned"
        );
        Ok(WorkspaceInformation {
            id: target.id,
            name: new_name.to_string(),
            owner: user.to_string(),
            moddate: commit,
            max_object_id: max_id,
            user_permission: Permission::Owner,
            global_read,
            locked: false,
            metadata: target.metadata,
        })
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
    use strata_store::InMemoryRecordStore;
    use strata_types::{Checksum, ObjectType, Provenance};

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

    // ---- Copy ----

    #[test]
    fn copying_to_a_new_name_copies_the_whole_history() {
        let eng = engine();
        let src = workspace(&eng, "src");
        workspace(&eng, "dst");
        save(&eng, &src, "obj", b"v1");
        save(&eng, &src, "obj", b"v2");
        save(&eng, &src, "obj", b"v3");

        let info = eng
            .copy_object("bob", &ident("src/obj"), &ident("dst/copy"))
            .unwrap();
        assert_eq!(info.workspace_id, 2);
        assert_eq!(info.object_id, 1);
        assert_eq!(info.name, "copy");
        assert_eq!(info.version, 3);
        assert_eq!(info.saved_by, "bob");

        let history = eng.get_object_history(&ident("dst/copy")).unwrap();
        assert_eq!(history.len(), 3);
        for v in 1..=3u32 {
            let copy = eng.store().get_version(2, 1, v).unwrap().unwrap();
            let orig = eng.store().get_version(1, 1, v).unwrap().unwrap();
            assert_eq!(copy.copied, Some(Reference::new(1, 1, v).unwrap()));
            assert_eq!(copy.checksum, orig.checksum);
            // payloads and provenance are shared, not duplicated
            assert_eq!(copy.provenance, orig.provenance);
        }
        let fetched = eng.get_objects(&[ident("dst/copy/2")]).unwrap();
        assert_eq!(fetched[0].data.bytes().unwrap(), b"v2");
    }

    #[test]
    fn copying_an_explicit_version_copies_only_it() {
        let eng = engine();
        let src = workspace(&eng, "src");
        workspace(&eng, "dst");
        save(&eng, &src, "obj", b"v1");
        save(&eng, &src, "obj", b"v2");
        save(&eng, &src, "obj", b"v3");

        let info = eng
            .copy_object("alice", &ident("src/obj/2"), &ident("dst/one"))
            .unwrap();
        assert_eq!(info.version, 1);
        let copy = eng.store().get_version(2, 1, 1).unwrap().unwrap();
        assert_eq!(copy.copied, Some(Reference::new(1, 1, 2).unwrap()));
        let orig = eng.store().get_version(1, 1, 2).unwrap().unwrap();
        assert_eq!(copy.checksum, orig.checksum);
        assert_eq!(eng.get_object_history(&ident("dst/one")).unwrap().len(), 1);
    }

    #[test]
    fn copying_onto_an_existing_object_appends_the_latest_version() {
        let eng = engine();
        let src = workspace(&eng, "src");
        let dst = workspace(&eng, "dst");
        save(&eng, &src, "obj", b"v1");
        save(&eng, &src, "obj", b"v2");
        save(&eng, &dst, "copy", b"own");

        let info = eng
            .copy_object("alice", &ident("src/obj"), &ident("dst/copy"))
            .unwrap();
        assert_eq!(info.version, 2);
        let obj = eng.store().get_object(2, 1).unwrap().unwrap();
        assert_eq!(obj.version_count, 2);
        let appended = eng.store().get_version(2, 1, 2).unwrap().unwrap();
        assert_eq!(appended.copied, Some(Reference::new(1, 1, 2).unwrap()));
        // the destination's own history is untouched
        assert!(eng.store().get_version(2, 1, 1).unwrap().unwrap().copied.is_none());
    }

    #[test]
    fn copy_ignores_a_version_on_the_destination() {
        let eng = engine();
        let src = workspace(&eng, "src");
        let dst = workspace(&eng, "dst");
        save(&eng, &src, "obj", b"v1");
        save(&eng, &dst, "copy", b"own");

        let info = eng
            .copy_object("alice", &ident("src/obj"), &ident("dst/copy/7"))
            .unwrap();
        assert_eq!(info.version, 2);
    }

    #[test]
    fn copying_onto_a_deleted_object_restores_it() {
        let eng = engine();
        let src = workspace(&eng, "src");
        let dst = workspace(&eng, "dst");
        save(&eng, &src, "obj", b"v1");
        save(&eng, &dst, "copy", b"own");
        save(&eng, &dst, "copy2", b"own");
        eng.set_objects_deleted(&[ident("dst/copy"), ident("dst/copy2")], true)
            .unwrap();

        // by name, through the deleted-holder fallback
        eng.copy_object("alice", &ident("src/obj"), &ident("dst/copy"))
            .unwrap();
        let by_name = eng.store().get_object(2, 1).unwrap().unwrap();
        assert!(!by_name.deleted);
        assert_eq!(by_name.version_count, 2);

        // by id
        eng.copy_object("alice", &ident("src/obj"), &ident("dst/2"))
            .unwrap();
        let by_id = eng.store().get_object(2, 2).unwrap().unwrap();
        assert!(!by_id.deleted);
        assert_eq!(by_id.version_count, 2);
    }

    #[test]
    fn copy_to_a_missing_object_id_is_an_error() {
        let eng = engine();
        let src = workspace(&eng, "src");
        workspace(&eng, "dst");
        save(&eng, &src, "obj", b"v1");

        let err = eng
            .copy_object("alice", &ident("src/obj"), &ident("dst/99"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Copy destination is specified as object id 99 in workspace 2 which does not exist."
        );
    }

    #[test]
    fn copying_a_versionless_object_reports_the_missing_version() {
        let eng = engine();
        workspace(&eng, "src");
        let next = eng.store().increment_object_counter(1, 1).unwrap();
        eng.store()
            .insert_object(ObjectRecord::new(1, next, "empty", Utc::now()))
            .unwrap();

        let err = eng
            .copy_object("alice", &ident("src/empty"), &ident("src/copy"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "No object with id 1 (name empty) and version 0 exists in workspace 1 (name src)"
        );
    }

    #[test]
    fn copying_increments_reference_counts_again() {
        let eng = engine();
        let ws = workspace(&eng, "ws");
        save(&eng, &ws, "a", b"data");
        let mut req = request("src", b"refs");
        req.refs = vec![Reference::new(1, 1, 1).unwrap()];
        eng.save_objects(&ws, "alice", vec![req]).unwrap();
        assert_eq!(eng.store().get_object(1, 1).unwrap().unwrap().refcounts, vec![1]);

        eng.copy_object("alice", &ident("ws/src"), &ident("ws/copy"))
            .unwrap();
        assert_eq!(eng.store().get_object(1, 1).unwrap().unwrap().refcounts, vec![2]);
    }

    // ---- Revert ----

    #[test]
    fn reverting_appends_a_version_marked_with_its_source() {
        let eng = engine();
        let ws = workspace(&eng, "ws");
        save(&eng, &ws, "obj", b"v1");
        save(&eng, &ws, "obj", b"v2");
        save(&eng, &ws, "obj", b"v3");

        let info = eng.revert_object("bob", &ident("ws/obj/2")).unwrap();
        assert_eq!(info.version, 4);
        assert_eq!(info.saved_by, "bob");
        let v4 = eng.store().get_version(1, 1, 4).unwrap().unwrap();
        let v2 = eng.store().get_version(1, 1, 2).unwrap().unwrap();
        assert_eq!(v4.reverted_from, Some(2));
        assert_eq!(v4.checksum, v2.checksum);
        assert_eq!(v4.provenance, v2.provenance);
        assert_eq!(info.checksum, v2.checksum);
        assert_eq!(eng.store().get_object(1, 1).unwrap().unwrap().version_count, 4);
    }

    #[test]
    fn reverting_without_a_version_duplicates_the_latest() {
        let eng = engine();
        let ws = workspace(&eng, "ws");
        save(&eng, &ws, "obj", b"v1");
        save(&eng, &ws, "obj", b"v2");

        let info = eng.revert_object("alice", &ident("ws/obj")).unwrap();
        assert_eq!(info.version, 3);
        let v3 = eng.store().get_version(1, 1, 3).unwrap().unwrap();
        assert_eq!(v3.reverted_from, Some(2));
    }

    #[test]
    fn reverting_a_copy_keeps_the_copied_marker() {
        let eng = engine();
        let ws = workspace(&eng, "ws");
        save(&eng, &ws, "obj", b"v1");
        eng.copy_object("alice", &ident("ws/obj"), &ident("ws/copy"))
            .unwrap();

        let info = eng.revert_object("alice", &ident("ws/copy")).unwrap();
        assert_eq!(info.version, 2);
        let v2 = eng.store().get_version(1, 2, 2).unwrap().unwrap();
        assert_eq!(v2.reverted_from, Some(1));
        assert_eq!(v2.copied, Some(Reference::new(1, 1, 1).unwrap()));
    }

    #[test]
    fn reverting_increments_reference_counts() {
        let eng = engine();
        let ws = workspace(&eng, "ws");
        save(&eng, &ws, "a", b"data");
        let mut req = request("src", b"refs");
        req.refs = vec![Reference::new(1, 1, 1).unwrap()];
        eng.save_objects(&ws, "alice", vec![req]).unwrap();

        eng.revert_object("alice", &ident("ws/src")).unwrap();
        assert_eq!(eng.store().get_object(1, 1).unwrap().unwrap().refcounts, vec![2]);
    }

    #[test]
    fn reverting_a_deleted_object_fails() {
        let eng = engine();
        let ws = workspace(&eng, "ws");
        save(&eng, &ws, "obj", b"v1");
        eng.set_objects_deleted(&[ident("ws/obj")], true).unwrap();

        let err = eng.revert_object("alice", &ident("ws/obj")).unwrap_err();
        assert!(matches!(err, EngineError::DeletedObject(_)));
    }

    // ---- Clone ----

    #[test]
    fn cloning_copies_live_objects_with_ids_and_history() {
        let eng = engine();
        let src = workspace(&eng, "src");
        save(&eng, &src, "a", b"a1");
        save(&eng, &src, "a", b"a2");
        save(&eng, &src, "b", b"b1");

        let info = eng
            .clone_workspace(
                "bob",
                &src,
                "mirror",
                true,
                Some("the mirror".to_string()),
                UserMetadata::empty(),
                &[],
            )
            .unwrap();
        assert_eq!(info.id, 2);
        assert_eq!(info.name, "mirror");
        assert_eq!(info.owner, "bob");
        assert_eq!(info.max_object_id, 2);
        assert_eq!(info.user_permission, Permission::Owner);
        assert!(info.global_read);
        assert!(!info.locked);

        let a = eng.store().get_object(2, 1).unwrap().unwrap();
        assert_eq!(a.name, "a");
        assert_eq!(a.version_count, 2);
        let b = eng.store().get_object(2, 2).unwrap().unwrap();
        assert_eq!(b.name, "b");
        assert_eq!(b.version_count, 1);

        // versions point back at their source and are restamped
        let a2 = eng.store().get_version(2, 1, 2).unwrap().unwrap();
        assert_eq!(a2.copied, Some(Reference::new(1, 1, 2).unwrap()));
        assert_eq!(a2.saved_by, "bob");
        let orig = eng.store().get_version(1, 1, 2).unwrap().unwrap();
        assert_eq!(a2.checksum, orig.checksum);

        // committed name resolves with ACLs and description in place
        let mirror = WorkspaceIdentifier::from_name("mirror").unwrap();
        let seen = eng.workspace_information(&mirror, Some("bob")).unwrap();
        assert_eq!(seen.user_permission, Permission::Owner);
        assert!(seen.global_read);
        assert_eq!(seen.max_object_id, 2);
        assert_eq!(
            eng.workspace_description(&mirror).unwrap(),
            Some("the mirror".to_string())
        );
    }

    #[test]
    fn clone_skips_deleted_and_excluded_objects() {
        let eng = engine();
        let src = workspace(&eng, "src");
        save(&eng, &src, "a", b"a1");
        save(&eng, &src, "b", b"b1");
        save(&eng, &src, "c", b"c1");
        eng.set_objects_deleted(&[ident("src/b")], true).unwrap();

        let info = eng
            .clone_workspace(
                "alice",
                &src,
                "trimmed",
                false,
                None,
                UserMetadata::empty(),
                &[ObjectIdOrName::from_name("c").unwrap()],
            )
            .unwrap();
        assert_eq!(info.max_object_id, 1);
        assert!(eng.store().get_object(2, 1).unwrap().is_some());
        assert!(eng.store().get_object(2, 2).unwrap().is_none());
        assert!(eng.store().get_object(2, 3).unwrap().is_none());
    }

    #[test]
    fn clone_preserves_hidden_flags() {
        let eng = engine();
        let src = workspace(&eng, "src");
        let mut shy = request("shy", b"x");
        shy.hidden = true;
        eng.save_objects(&src, "alice", vec![shy]).unwrap();
        save(&eng, &src, "plain", b"y");

        eng.clone_workspace("alice", &src, "mirror", false, None, UserMetadata::empty(), &[])
            .unwrap();
        assert!(eng.store().get_object(2, 1).unwrap().unwrap().hidden);
        assert!(!eng.store().get_object(2, 2).unwrap().unwrap().hidden);
    }

    #[test]
    fn clone_exclusions_must_exist() {
        let eng = engine();
        let src = workspace(&eng, "src");
        save(&eng, &src, "a", b"a1");

        let err = eng
            .clone_workspace(
                "alice",
                &src,
                "mirror",
                false,
                None,
                UserMetadata::empty(),
                &[ObjectIdOrName::from_name("ghost").unwrap()],
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "No object with name ghost exists in workspace 1 (name src)"
        );
        // nothing was created for the failed clone
        assert!(eng.store().get_workspace_by_id(2).unwrap().is_none());
    }

    #[test]
    fn cloning_to_a_taken_name_fails_before_copying() {
        let eng = engine();
        let src = workspace(&eng, "src");
        workspace(&eng, "taken");
        save(&eng, &src, "a", b"a1");

        let err = eng
            .clone_workspace("alice", &src, "taken", false, None, UserMetadata::empty(), &[])
            .unwrap_err();
        assert_eq!(err.to_string(), "Workspace name taken is already in use");
        assert!(eng.store().get_workspace_by_id(3).unwrap().is_none());
    }

    #[test]
    fn clone_counts_raced_ids_but_skips_their_objects() {
        let eng = engine();
        let src = workspace(&eng, "src");
        save(&eng, &src, "real", b"x");
        // counter moved with no versions at all: filtered out entirely
        let id = eng.store().increment_object_counter(1, 1).unwrap();
        eng.store()
            .insert_object(ObjectRecord::new(1, id, "empty", Utc::now()))
            .unwrap();
        // counter and version count moved, version records never landed:
        // skipped, but its id still reserves the clone's id space
        let id = eng.store().increment_object_counter(1, 1).unwrap();
        eng.store()
            .insert_object(ObjectRecord::new(1, id, "phantom", Utc::now()))
            .unwrap();
        eng.store()
            .append_versions(1, id, 2, None, Utc::now())
            .unwrap();

        let info = eng
            .clone_workspace("alice", &src, "mirror", false, None, UserMetadata::empty(), &[])
            .unwrap();
        assert_eq!(info.max_object_id, 3);
        assert!(eng.store().get_object(2, 1).unwrap().is_some());
        assert!(eng.store().get_object(2, 2).unwrap().is_none());
        assert!(eng.store().get_object(2, 3).unwrap().is_none());
    }

    #[test]
    fn cloning_a_deleted_workspace_fails() {
        let eng = engine();
        let src = workspace(&eng, "src");
        eng.set_workspace_deleted(&src, true).unwrap();

        let err = eng
            .clone_workspace("alice", &src, "mirror", false, None, UserMetadata::empty(), &[])
            .unwrap_err();
        assert!(matches!(err, EngineError::WorkspaceDeleted(_)));
    }
}
