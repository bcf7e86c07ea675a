//! Object flag administration, rename, and name completion.

use std::collections::BTreeSet;

use strata_blobs::BlobStore;
use strata_store::{RecordStore, StoreError};
use strata_types::{check_object_name, ObjectIdentifier, ObjectInformation, WorkspaceIdentifier};
use tracing::debug;

use crate::engine::WorkspaceEngine;
use crate::error::{EngineError, EngineResult};
use crate::read::version_info;
use crate::resolver::ResolveFlags;

impl<S: RecordStore, B: BlobStore> WorkspaceEngine<S, B> {
    // ---- Delete and hide flags ----

    /// Soft-delete or restore a batch of objects.
    ///
    /// Deleting requires live objects; restoring resolves deleted ones.
    /// Restoring an object whose name was claimed by a newer object
    /// while it was deleted fails with the store's duplicate-name error.
    /// Every workspace holding an affected object gets its modification
    /// date bumped.
    pub fn set_objects_deleted(
        &self,
        objects: &[ObjectIdentifier],
        delete: bool,
    ) -> EngineResult<()> {
        let flags = if delete {
            ResolveFlags::strict()
        } else {
            ResolveFlags::allow_deleted()
        };
        let resolved = self.resolve_objects(objects, flags)?;
        let now = Self::now();
        let mut touched = BTreeSet::new();
        for res in resolved.into_iter().flatten() {
            if res.deleted != delete {
                self.store
                    .set_object_deleted(res.workspace_id, res.object_id, delete, now)?;
            }
            touched.insert(res.workspace_id);
        }
        for wsid in touched {
            self.store.touch_workspace(wsid, now)?;
        }
        Ok(())
    }

    /// Hide or unhide a batch of objects. Hidden objects are skipped by
    /// listings unless asked for; everything else behaves as normal.
    /// Both directions require live objects.
    pub fn set_objects_hidden(
        &self,
        objects: &[ObjectIdentifier],
        hidden: bool,
    ) -> EngineResult<()> {
        let resolved = self.resolve_objects(objects, ResolveFlags::strict())?;
        let now = Self::now();
        let mut touched = BTreeSet::new();
        for res in resolved.into_iter().flatten() {
            let rec = self
                .store
                .get_object(res.workspace_id, res.object_id)?
                .ok_or_else(|| {
                    EngineError::Corrupt(format!(
                        "object {}/{} vanished during a flag update",
                        res.workspace_id, res.object_id
                    ))
                })?;
            if rec.hidden != hidden {
                self.store
                    .set_object_hidden(res.workspace_id, res.object_id, hidden, now)?;
            }
            touched.insert(res.workspace_id);
        }
        for wsid in touched {
            self.store.touch_workspace(wsid, now)?;
        }
        Ok(())
    }

    // ---- Rename ----

    /// Rename a live object, returning the information record of its
    /// latest version under the new name.
    pub fn rename_object(
        &self,
        oi: &ObjectIdentifier,
        new_name: &str,
    ) -> EngineResult<ObjectInformation> {
        check_object_name(new_name)?;
        let ws = self.resolve_workspace(oi.workspace())?;
        let res = self
            .resolve_object_in_workspace(&ws, oi.object(), None, ResolveFlags::strict())?
            .ok_or_else(|| {
                EngineError::Corrupt(format!("strict resolution of {oi} produced no record"))
            })?;
        if res.name == new_name {
            return Err(EngineError::IllegalArgument(format!(
                "Object is already named {new_name}"
            )));
        }
        let now = Self::now();
        match self.store.rename_object(ws.id, res.object_id, new_name, now) {
            Err(StoreError::DuplicateObjectName { .. }) => {
                return Err(EngineError::IllegalArgument(format!(
                    "There is already an object in the workspace named {new_name}"
                )));
            }
            other => other?,
        }
        self.store.touch_workspace(ws.id, now)?;
        debug!(
            workspace = ws.id,
            object = res.object_id,
            old = %res.name,
            new = new_name,
            "object renamed"
        );
        let mut renamed = res;
        renamed.name = new_name.to_string();
        let ver = self
            .store
            .get_version(ws.id, renamed.object_id, renamed.version)?
            .ok_or_else(|| self.version_not_found(&renamed, &ws.name))?;
        Ok(version_info(&ws, &renamed.name, &ver, true))
    }

    // ---- Name completion ----

    /// Live object names starting with `prefix`, one list per input
    /// workspace, in input order. Hidden objects are skipped unless
    /// `include_hidden`; `limit` caps the total name count across all
    /// workspaces, zero meaning no cap.
    pub fn get_names_by_prefix(
        &self,
        workspaces: &[WorkspaceIdentifier],
        prefix: &str,
        include_hidden: bool,
        limit: usize,
    ) -> EngineResult<Vec<Vec<String>>> {
        let mut out = Vec::with_capacity(workspaces.len());
        let mut total = 0usize;
        for wsi in workspaces {
            let ws = self.resolve_workspace(wsi)?;
            let mut names = Vec::new();
            for rec in self.store.list_objects_in_workspace(ws.id)? {
                if limit > 0 && total >= limit {
                    break;
                }
                if rec.deleted || (rec.hidden && !include_hidden) {
                    continue;
                }
                if rec.name.starts_with(prefix) {
                    names.push(rec.name);
                    total += 1;
                }
            }
            out.push(names);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
