//! Object reads: payloads, information records, history, reference counts.

use std::collections::HashMap;

use strata_blobs::{BlobStore, ByteCache, ByteCacheManager};
use strata_store::{RecordStore, VersionRecord};
use strata_types::{ObjectIdentifier, ObjectInformation, Provenance, Reference};
use tracing::debug;

use crate::engine::WorkspaceEngine;
use crate::error::{EngineError, EngineResult};
use crate::resolver::{ResolveFlags, ResolvedObject, ResolvedWorkspace};

/// One fetched object version: the information record, lineage, reference
/// lists, and the payload in a memory-bounded handle.
#[derive(Debug)]
pub struct ObjectData {
    pub info: ObjectInformation,
    /// Lineage with each action's resolved input references filled back in.
    pub provenance: Provenance,
    /// Outgoing references extracted from the payload at save time.
    pub refs: Vec<Reference>,
    /// Where this version was copied from, if anywhere.
    pub copied: Option<Reference>,
    /// External ids extracted from the payload, keyed by id type.
    pub extracted_ids: std::collections::BTreeMap<String, Vec<String>>,
    pub data: ByteCache,
}

/// Build an information record from a version and its containing
/// workspace and object names.
pub(crate) fn version_info(
    ws: &ResolvedWorkspace,
    name: &str,
    ver: &VersionRecord,
    include_metadata: bool,
) -> ObjectInformation {
    ObjectInformation {
        object_id: ver.object_id,
        name: name.to_string(),
        object_type: ver.object_type.clone(),
        saved: ver.saved,
        version: ver.version,
        saved_by: ver.saved_by.clone(),
        workspace_id: ws.id,
        workspace_name: ws.name.clone(),
        checksum: ver.checksum,
        size: ver.size,
        metadata: include_metadata.then(|| ver.metadata.clone()),
    }
}

/// Hand each action its slice of the flattened reference list, in action
/// order. Fails when the list does not line up with the recorded input
/// counts.
fn redistribute_refs(prov: &mut Provenance, refs: &[Reference]) -> Result<(), usize> {
    if refs.len() != prov.input_object_count() {
        return Err(prov.input_object_count());
    }
    let mut rest = refs;
    for action in &mut prov.actions {
        let (head, tail) = rest.split_at(action.input_objects.len());
        action.resolved_objects = head.to_vec();
        rest = tail;
    }
    Ok(())
}

impl<S: RecordStore, B: BlobStore> WorkspaceEngine<S, B> {
    // ---- Payload reads ----

    /// Fetch a batch of object versions with their payloads.
    ///
    /// The summed payload size is checked against the configured budget
    /// before any blob is streamed; content is then buffered through a
    /// fresh [`ByteCacheManager`] whose memory and disk budgets span
    /// this one call.
    pub fn get_objects(&self, objects: &[ObjectIdentifier]) -> EngineResult<Vec<ObjectData>> {
        let resolved = self.resolve_objects(objects, ResolveFlags::strict())?;
        let resolved: Vec<ResolvedObject> = resolved
            .into_iter()
            .map(|res| {
                res.ok_or_else(|| {
                    EngineError::Corrupt("strict resolution produced no record".to_string())
                })
            })
            .collect::<EngineResult<_>>()?;
        let workspaces = self.workspaces_by_id(resolved.iter().map(|r| r.workspace_id))?;

        let keys: Vec<(u64, u64, u32)> = resolved
            .iter()
            .map(|r| (r.workspace_id, r.object_id, r.version))
            .collect();
        let mut versions = Vec::with_capacity(resolved.len());
        for (res, ver) in resolved.iter().zip(self.store.get_versions(&keys)?) {
            let ws = &workspaces[&res.workspace_id];
            versions.push(ver.ok_or_else(|| self.version_not_found(res, &ws.name))?);
        }

        let total: u64 = versions.iter().map(|v| v.size).sum();
        if total > self.config.max_returned_data_size {
            return Err(EngineError::IllegalArgument(format!(
                "Too much data requested from the workspace at once; data requested is {total}B \
                 which exceeds maximum of {max}B",
                max = self.config.max_returned_data_size
            )));
        }
        debug!(count = versions.len(), total, "fetching object payloads");

        let prov_ids: Vec<uuid::Uuid> = versions.iter().map(|v| v.provenance).collect();
        let provenance = self.store.get_provenance(&prov_ids)?;

        let mut manager = ByteCacheManager::new(
            self.config.max_returned_data_memory,
            self.config.max_returned_data_size,
        );
        if let Some(dir) = &self.config.temp_dir {
            manager = manager.with_temp_dir(dir.clone());
        }

        let mut out = Vec::with_capacity(versions.len());
        for ((res, ver), prov) in resolved.iter().zip(versions).zip(provenance) {
            let ws = &workspaces[&res.workspace_id];
            let mut prov = prov.ok_or_else(|| {
                EngineError::Corrupt(format!(
                    "provenance record {} missing for object {}/{}/{}",
                    ver.provenance, ver.workspace_id, ver.object_id, ver.version
                ))
            })?;
            if let Err(expected) = redistribute_refs(&mut prov, &ver.provenance_refs) {
                return Err(EngineError::Corrupt(format!(
                    "version {}/{}/{} carries {} provenance refs for {} action inputs",
                    ver.workspace_id,
                    ver.object_id,
                    ver.version,
                    ver.provenance_refs.len(),
                    expected
                )));
            }
            let data = self.blobs.get_blob(&ver.checksum, &mut manager)?;
            out.push(ObjectData {
                info: version_info(ws, &res.name, &ver, true),
                provenance: prov,
                refs: ver.refs,
                copied: ver.copied,
                extracted_ids: ver.extracted_ids,
                data,
            });
        }
        Ok(out)
    }

    // ---- Information reads ----

    /// Information records for a batch of objects, without payloads.
    ///
    /// `flags` picks the treatment of deleted and missing objects:
    /// [`ResolveFlags::strict`] raises for both,
    /// [`ResolveFlags::allow_deleted`] reads through deletion, and
    /// [`ResolveFlags::live_only`] yields `None` for anything not
    /// plainly readable. Metadata is attached only when
    /// `include_metadata` is set.
    pub fn get_object_information(
        &self,
        objects: &[ObjectIdentifier],
        include_metadata: bool,
        flags: ResolveFlags,
    ) -> EngineResult<Vec<Option<ObjectInformation>>> {
        let resolved = self.resolve_objects(objects, flags)?;
        let workspaces =
            self.workspaces_by_id(resolved.iter().flatten().map(|r| r.workspace_id))?;

        let mut out = Vec::with_capacity(resolved.len());
        for res in resolved {
            let res = match res {
                Some(res) => res,
                None => {
                    out.push(None);
                    continue;
                }
            };
            let ws = &workspaces[&res.workspace_id];
            match self.store.get_version(res.workspace_id, res.object_id, res.version)? {
                Some(ver) => out.push(Some(version_info(ws, &res.name, &ver, include_metadata))),
                None if !flags.except_if_missing => out.push(None),
                None => return Err(self.version_not_found(&res, &ws.name)),
            }
        }
        Ok(out)
    }

    /// Every version of one object, oldest first.
    pub fn get_object_history(
        &self,
        oi: &ObjectIdentifier,
    ) -> EngineResult<Vec<ObjectInformation>> {
        let ws = self.resolve_workspace(oi.workspace())?;
        let res = self
            .resolve_object_in_workspace(&ws, oi.object(), oi.version(), ResolveFlags::strict())?
            .ok_or_else(|| {
                EngineError::Corrupt(format!("strict resolution of {oi} produced no record"))
            })?;
        let rec = self
            .store
            .get_object(ws.id, res.object_id)?
            .ok_or_else(|| {
                EngineError::Corrupt(format!(
                    "object {}/{} vanished during a history read",
                    ws.id, res.object_id
                ))
            })?;
        let keys: Vec<(u64, u64, u32)> =
            (1..=rec.version_count).map(|v| (ws.id, res.object_id, v)).collect();
        // trailing versions may not be visible mid-save; skip the gaps
        Ok(self
            .store
            .get_versions(&keys)?
            .into_iter()
            .flatten()
            .map(|ver| version_info(&ws, &res.name, &ver, true))
            .collect())
    }

    // ---- Reference counts ----

    /// Per-version incoming reference counts for a batch of objects.
    ///
    /// Slot `v - 1` of each returned array is the number of stored
    /// references pointing at version `v`.
    pub fn get_reference_counts(
        &self,
        objects: &[ObjectIdentifier],
    ) -> EngineResult<Vec<Vec<u64>>> {
        let resolved = self.resolve_objects(objects, ResolveFlags::strict())?;
        let mut out = Vec::with_capacity(resolved.len());
        for res in resolved.into_iter().flatten() {
            let rec = self
                .store
                .get_object(res.workspace_id, res.object_id)?
                .ok_or_else(|| {
                    EngineError::Corrupt(format!(
                        "object {}/{} vanished during a refcount read",
                        res.workspace_id, res.object_id
                    ))
                })?;
            out.push(rec.refcounts);
        }
        Ok(out)
    }

    /// Resolved workspaces for a set of ids already known to exist.
    pub(crate) fn workspaces_by_id(
        &self,
        ids: impl IntoIterator<Item = u64>,
    ) -> EngineResult<HashMap<u64, ResolvedWorkspace>> {
        let distinct: Vec<u64> = {
            let mut ids: Vec<u64> = ids.into_iter().collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        let mut out = HashMap::with_capacity(distinct.len());
        for rec in self.store.get_workspaces_by_ids(&distinct)? {
            out.insert(rec.id, ResolvedWorkspace::from_record(&rec)?);
        }
        for id in &distinct {
            if !out.contains_key(id) {
                return Err(EngineError::Corrupt(format!(
                    "Workspace {id} was unexpectedly deleted from the database"
                )));
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
