//! The save pipeline.
//!
//! Saving is ordered so that a crash at any point leaves only states the
//! read paths already tolerate: blobs land before any counters move,
//! counters move before version records exist, and version records are
//! inserted as the last batch before the workspace timestamp. Nothing
//! here is transactional; the record store's atomic counters and unique
//! name index are the only synchronization.

use std::collections::{BTreeMap, HashMap};

use strata_blobs::BlobStore;
use strata_store::{ObjectRecord, RecordStore, StoreError, VersionRecord};
use strata_types::{
    Checksum, ObjectIdOrName, ObjectInformation, ObjectType, Provenance, Reference, UserMetadata,
    WorkspaceIdentifier,
};
use tracing::{debug, info};

use crate::engine::WorkspaceEngine;
use crate::error::{EngineError, EngineResult};
use crate::read::version_info;
use crate::resolver::ResolvedWorkspace;

/// One object to save: payload, identity, and lineage, all pre-validated
/// by the type checking layer.
///
/// The checksum and outgoing reference lists arrive resolved; this layer
/// stores what it is given and never hashes or rewrites payloads.
#[derive(Debug)]
pub struct SaveRequest {
    /// Name for a new or existing object, or the id of an existing one.
    pub target: ObjectIdOrName,
    pub object_type: ObjectType,
    /// Canonical payload bytes, exactly as hashed by the validator.
    pub data: Vec<u8>,
    pub checksum: Checksum,
    /// Whether the payload's keys are canonically sorted.
    pub sorted: bool,
    pub metadata: UserMetadata,
    /// Lineage with each action's `resolved_objects` filled in to match
    /// its `input_objects`.
    pub provenance: Provenance,
    /// Resolved references extracted from the payload.
    pub refs: Vec<Reference>,
    /// External ids extracted from the payload, keyed by id type.
    pub extracted_ids: std::collections::BTreeMap<String, Vec<String>>,
    /// Hide the object on creation. Ignored for existing objects.
    pub hidden: bool,
}

impl SaveRequest {
    pub fn new(
        target: ObjectIdOrName,
        object_type: ObjectType,
        data: Vec<u8>,
        checksum: Checksum,
        provenance: Provenance,
    ) -> Self {
        Self {
            target,
            object_type,
            data,
            checksum,
            sorted: false,
            metadata: UserMetadata::empty(),
            provenance,
            refs: Vec::new(),
            extracted_ids: std::collections::BTreeMap::new(),
            hidden: false,
        }
    }
}

/// `#<position>, <target>` for save validation errors, 1-based.
fn object_error_id(target: &ObjectIdOrName, index: usize) -> String {
    format!("#{}, {target}", index + 1)
}

enum SaveTarget {
    Existing(ObjectRecord),
    New(String),
}

impl<S: RecordStore, B: BlobStore> WorkspaceEngine<S, B> {
    /// Save a batch of objects into one workspace, returning an
    /// information record per input in input order.
    ///
    /// Version numbers and object ids are drawn from atomic counters, so
    /// concurrent saves interleave without collisions; a name-insert
    /// race appends to the winner's object instead of failing. A request
    /// naming an object deleted since the name was freed creates a fresh
    /// object; saving to a deleted object's id restores it.
    pub fn save_objects(
        &self,
        wsi: &WorkspaceIdentifier,
        user: &str,
        requests: Vec<SaveRequest>,
    ) -> EngineResult<Vec<ObjectInformation>> {
        if requests.is_empty() {
            return Err(EngineError::IllegalArgument("No data provided".to_string()));
        }
        let ws = self.resolve_workspace(wsi)?;
        self.check_save_limits(&requests)?;
        let targets = self.resolve_save_targets(&ws, &requests)?;

        // blobs before anything else; dedup makes replays harmless
        for req in &requests {
            self.blobs
                .save_blob(&req.checksum, &mut req.data.as_slice(), req.sorted)?;
        }

        let mut prov_refs = Vec::with_capacity(requests.len());
        let mut stored_prov = Vec::with_capacity(requests.len());
        for req in &requests {
            prov_refs.push(req.provenance.flattened_resolved_refs());
            let mut prov = req.provenance.clone();
            prov.workspace_id = Some(ws.id);
            // per-action refs live flattened on the version record and
            // are redistributed on read
            for action in &mut prov.actions {
                action.resolved_objects = Vec::new();
            }
            stored_prov.push(prov);
        }
        let prov_ids = self.store.insert_provenance(stored_prov)?;

        self.apply_reference_counts(&requests, &prov_refs)?;

        let assigned = self.assign_new_object_ids(&ws, &targets)?;

        let now = Self::now();
        let mut claimed: HashMap<String, u64> = HashMap::new();
        let mut versions = Vec::with_capacity(requests.len());
        let mut infos = Vec::with_capacity(requests.len());
        for (i, ((req, target), prov_id)) in
            requests.iter().zip(&targets).zip(prov_ids).enumerate()
        {
            let (object_id, name) = match target {
                SaveTarget::Existing(rec) => {
                    if rec.deleted {
                        self.store.set_object_deleted(ws.id, rec.id, false, now)?;
                    }
                    (rec.id, rec.name.clone())
                }
                SaveTarget::New(name) => match claimed.get(name) {
                    Some(id) => (*id, name.clone()),
                    None => {
                        let next = assigned.get(name).copied().ok_or_else(|| {
                            EngineError::Corrupt(format!(
                                "no id assigned for new object name {name}"
                            ))
                        })?;
                        let id = self.claim_object_name(&ws, name, next, req.hidden, now)?;
                        claimed.insert(name.clone(), id);
                        (id, name.clone())
                    }
                },
            };
            let version = self
                .store
                .append_versions(ws.id, object_id, 1, None, now)?
                .ok_or_else(|| {
                    EngineError::Corrupt(format!(
                        "object {}/{object_id} vanished during a save",
                        ws.id
                    ))
                })?;
            let ver = VersionRecord {
                workspace_id: ws.id,
                object_id,
                version,
                saved_by: user.to_string(),
                saved: now,
                object_type: req.object_type.clone(),
                checksum: req.checksum,
                size: req.data.len() as u64,
                metadata: req.metadata.clone(),
                admin_metadata: UserMetadata::empty(),
                refs: req.refs.clone(),
                provenance_refs: prov_refs[i].clone(),
                provenance: prov_id,
                copied: None,
                reverted_from: None,
                extracted_ids: req.extracted_ids.clone(),
            };
            infos.push(version_info(&ws, &name, &ver, true));
            versions.push(ver);
        }
        self.store.insert_versions(versions)?;
        self.store.touch_workspace(ws.id, now)?;
        info!(
            workspace = ws.id,
            count = infos.len(),
            user,
            "objects saved"
        );
        Ok(infos)
    }

    /// Reject the whole batch before any write if a payload, metadata
    /// map, or provenance document is over the configured limits, or a
    /// provenance action's resolved references do not line up with its
    /// declared inputs.
    fn check_save_limits(&self, requests: &[SaveRequest]) -> EngineResult<()> {
        for (i, req) in requests.iter().enumerate() {
            let eid = object_error_id(&req.target, i);
            let size = req.data.len() as u64;
            if size > self.config.max_object_size {
                return Err(EngineError::IllegalArgument(format!(
                    "Object {eid} data size {size} exceeds limit of {max}",
                    max = self.config.max_object_size
                )));
            }
            req.metadata.check_size()?;
            // provenance is stored as a JSON document; bound that form
            let prov_size = serde_json::to_vec(&req.provenance)
                .map(|b| b.len())
                .unwrap_or(usize::MAX);
            if prov_size > self.config.max_provenance_size {
                return Err(EngineError::IllegalArgument(format!(
                    "Object {eid} provenance size {prov_size} exceeds limit of {max}",
                    max = self.config.max_provenance_size
                )));
            }
            for (j, action) in req.provenance.actions.iter().enumerate() {
                if action.resolved_objects.len() != action.input_objects.len() {
                    return Err(EngineError::IllegalArgument(format!(
                        "Object {eid} provenance action {} supplies {} resolved references \
                         for {} input objects",
                        j + 1,
                        action.resolved_objects.len(),
                        action.input_objects.len()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Sort requests into existing objects and to-be-created names.
    ///
    /// Name targets consult the live name index only, so a name freed by
    /// deletion starts a fresh object rather than reviving the deleted
    /// holder. Id targets resolve deleted objects; a missing id is a
    /// hard error.
    fn resolve_save_targets(
        &self,
        ws: &ResolvedWorkspace,
        requests: &[SaveRequest],
    ) -> EngineResult<Vec<SaveTarget>> {
        let mut targets = Vec::with_capacity(requests.len());
        for req in requests {
            match &req.target {
                ObjectIdOrName::Id(id) => {
                    let rec = self.store.get_object(ws.id, *id)?.ok_or_else(|| {
                        EngineError::NoSuchObject(format!("There is no object with id {id}"))
                    })?;
                    targets.push(SaveTarget::Existing(rec));
                }
                ObjectIdOrName::Name(name) => {
                    match self.store.get_object_by_live_name(ws.id, name)? {
                        Some(rec) => targets.push(SaveTarget::Existing(rec)),
                        None => targets.push(SaveTarget::New(name.clone())),
                    }
                }
            }
        }
        Ok(targets)
    }

    /// Count incoming references across the whole batch, object refs and
    /// provenance refs together.
    fn apply_reference_counts(
        &self,
        requests: &[SaveRequest],
        prov_refs: &[Vec<Reference>],
    ) -> EngineResult<()> {
        let refs = requests
            .iter()
            .zip(prov_refs)
            .flat_map(|(req, flattened)| req.refs.iter().chain(flattened.iter()).copied());
        self.increment_reference_counts(refs)
    }

    /// Bump the incoming-reference count of every target, one store
    /// update per distinct (version, amount) pair.
    ///
    /// A reference appearing n times in the input increments its
    /// target's count by n in a single update.
    pub(crate) fn increment_reference_counts(
        &self,
        refs: impl IntoIterator<Item = Reference>,
    ) -> EngineResult<()> {
        let mut counts: BTreeMap<Reference, u64> = BTreeMap::new();
        for r in refs {
            *counts.entry(r).or_insert(0) += 1;
        }
        if counts.is_empty() {
            return Ok(());
        }
        let mut groups: BTreeMap<(u32, u64), BTreeMap<u64, Vec<u64>>> = BTreeMap::new();
        for (r, count) in counts {
            groups
                .entry((r.version(), count))
                .or_default()
                .entry(r.workspace())
                .or_default()
                .push(r.object());
        }
        debug!(updates = groups.len(), "applying reference count increments");
        for ((version, amount), by_workspace) in groups {
            let targets: Vec<(u64, Vec<u64>)> = by_workspace.into_iter().collect();
            self.store.bulk_increment_refcounts(version, amount, &targets)?;
        }
        Ok(())
    }

    /// Advance the workspace's object counter once for all new names in
    /// the batch and hand out the owned id range in first-appearance
    /// order.
    fn assign_new_object_ids(
        &self,
        ws: &ResolvedWorkspace,
        targets: &[SaveTarget],
    ) -> EngineResult<HashMap<String, u64>> {
        let mut new_names: Vec<&str> = Vec::new();
        for target in targets {
            if let SaveTarget::New(name) = target {
                if !new_names.contains(&name.as_str()) {
                    new_names.push(name);
                }
            }
        }
        let mut assigned = HashMap::with_capacity(new_names.len());
        if !new_names.is_empty() {
            let n = new_names.len() as u64;
            let after = self.store.increment_object_counter(ws.id, n)?;
            let first = after - n + 1;
            for (offset, name) in new_names.into_iter().enumerate() {
                assigned.insert(name.to_string(), first + offset as u64);
            }
        }
        Ok(assigned)
    }

    /// Insert the container record for a new object name. Losing the
    /// name to a concurrent save is not an error; the version goes to
    /// the object that won. A name that disappears between the failed
    /// insert and the follow-up read is retried up to the configured
    /// attempt count.
    pub(crate) fn claim_object_name(
        &self,
        ws: &ResolvedWorkspace,
        name: &str,
        id: u64,
        hidden: bool,
        now: chrono::DateTime<chrono::Utc>,
    ) -> EngineResult<u64> {
        for attempt in 1..=self.config.name_race_attempts {
            let mut rec = ObjectRecord::new(ws.id, id, name, now);
            rec.hidden = hidden;
            match self.store.insert_object(rec) {
                Ok(()) => return Ok(id),
                Err(StoreError::DuplicateObjectName { .. }) => {
                    match self.store.get_object_by_live_name(ws.id, name)? {
                        Some(winner) => {
                            debug!(
                                workspace = ws.id,
                                name,
                                winner = winner.id,
                                "lost object name race, appending to winner"
                            );
                            return Ok(winner.id);
                        }
                        None => {
                            debug!(attempt, name, "object name freed mid-claim, retrying");
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::Corrupt(format!(
            "object name {name} in workspace {} taken and released mid-save",
            ws.id
        )))
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
    use strata_types::ProvenanceAction;

    use crate::EngineConfig;

    fn engine() -> WorkspaceEngine<InMemoryRecordStore, MemoryBlobStore> {
        WorkspaceEngine::new(InMemoryRecordStore::new(), MemoryBlobStore::new())
    }

    fn seeded(
        eng: &WorkspaceEngine<InMemoryRecordStore, MemoryBlobStore>,
    ) -> WorkspaceIdentifier {
        eng.create_workspace("alice", "ws", false, None, UserMetadata::empty())
            .unwrap();
        WorkspaceIdentifier::from_name("ws").unwrap()
    }

    fn request(name: &str, payload: &[u8]) -> SaveRequest {
        let mut sum = [0u8; 16];
        let digest: Vec<u8> = payload.iter().copied().chain(name.bytes()).collect();
        for (i, b) in digest.iter().enumerate() {
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

    fn request_by_id(id: u64, payload: &[u8]) -> SaveRequest {
        let mut req = request("ignored", payload);
        req.target = ObjectIdOrName::from_id(id).unwrap();
        req
    }

    // ---- Creation and appending ----

    #[test]
    fn saves_assign_ids_and_versions_in_input_order() {
        let eng = engine();
        let ws = seeded(&eng);

        let infos = eng
            .save_objects(&ws, "alice", vec![request("a", b"1"), request("b", b"22")])
            .unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!((infos[0].object_id, infos[0].version), (1, 1));
        assert_eq!((infos[1].object_id, infos[1].version), (2, 1));
        assert_eq!(infos[0].name, "a");
        assert_eq!(infos[1].name, "b");
        assert_eq!(infos[1].size, 2);
        assert_eq!(infos[0].saved_by, "alice");
        assert_eq!(infos[0].workspace_name, "ws");

        let ws_info = eng.workspace_information(&ws, None).unwrap();
        assert_eq!(ws_info.max_object_id, 2);
    }

    #[test]
    fn same_new_name_twice_in_a_batch_stacks_versions() {
        let eng = engine();
        let ws = seeded(&eng);

        let infos = eng
            .save_objects(&ws, "alice", vec![request("foo", b"v1"), request("foo", b"v2")])
            .unwrap();
        assert_eq!((infos[0].object_id, infos[0].version), (1, 1));
        assert_eq!((infos[1].object_id, infos[1].version), (1, 2));
        // only one id was consumed
        assert_eq!(eng.workspace_information(&ws, None).unwrap().max_object_id, 1);
    }

    #[test]
    fn saving_to_an_existing_name_appends() {
        let eng = engine();
        let ws = seeded(&eng);
        eng.save_objects(&ws, "alice", vec![request("foo", b"v1")]).unwrap();

        let infos = eng
            .save_objects(&ws, "bob", vec![request("foo", b"v2")])
            .unwrap();
        assert_eq!((infos[0].object_id, infos[0].version), (1, 2));
        assert_eq!(infos[0].saved_by, "bob");
    }

    #[test]
    fn saving_by_id_appends_and_missing_id_fails() {
        let eng = engine();
        let ws = seeded(&eng);
        eng.save_objects(&ws, "alice", vec![request("foo", b"v1")]).unwrap();

        let infos = eng
            .save_objects(&ws, "alice", vec![request_by_id(1, b"v2")])
            .unwrap();
        assert_eq!((infos[0].object_id, infos[0].version), (1, 2));
        assert_eq!(infos[0].name, "foo");

        let err = eng
            .save_objects(&ws, "alice", vec![request_by_id(99, b"v3")])
            .unwrap_err();
        assert_eq!(err.to_string(), "There is no object with id 99");
    }

    #[test]
    fn freed_names_start_fresh_objects() {
        let eng = engine();
        let ws = seeded(&eng);
        eng.save_objects(&ws, "alice", vec![request("foo", b"v1")]).unwrap();
        eng.store().set_object_deleted(1, 1, true, Utc::now()).unwrap();

        let infos = eng
            .save_objects(&ws, "alice", vec![request("foo", b"v2")])
            .unwrap();
        assert_eq!((infos[0].object_id, infos[0].version), (2, 1));
        // the deleted holder is untouched
        let old = eng.store().get_object(1, 1).unwrap().unwrap();
        assert!(old.deleted);
        assert_eq!(old.version_count, 1);
    }

    #[test]
    fn saving_to_a_deleted_id_restores_the_object() {
        let eng = engine();
        let ws = seeded(&eng);
        eng.save_objects(&ws, "alice", vec![request("foo", b"v1")]).unwrap();
        eng.store().set_object_deleted(1, 1, true, Utc::now()).unwrap();

        let infos = eng
            .save_objects(&ws, "alice", vec![request_by_id(1, b"v2")])
            .unwrap();
        assert_eq!((infos[0].object_id, infos[0].version), (1, 2));
        assert!(!eng.store().get_object(1, 1).unwrap().unwrap().deleted);
    }

    #[test]
    fn hidden_flag_applies_to_new_objects_only() {
        let eng = engine();
        let ws = seeded(&eng);
        let mut hidden = request("shy", b"v1");
        hidden.hidden = true;
        eng.save_objects(&ws, "alice", vec![hidden]).unwrap();
        assert!(eng.store().get_object(1, 1).unwrap().unwrap().hidden);

        // appending with the flag does not unhide or re-hide
        let mut plain = request("shy", b"v2");
        plain.hidden = false;
        eng.save_objects(&ws, "alice", vec![plain]).unwrap();
        assert!(eng.store().get_object(1, 1).unwrap().unwrap().hidden);
    }

    // ---- Validation ----

    #[test]
    fn empty_batches_are_rejected() {
        let eng = engine();
        let ws = seeded(&eng);
        let err = eng.save_objects(&ws, "alice", Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "No data provided");
    }

    #[test]
    fn oversized_payload_fails_the_whole_batch() {
        let mut config = EngineConfig::for_tests();
        config.max_object_size = 4;
        let eng = WorkspaceEngine::with_config(
            InMemoryRecordStore::new(),
            MemoryBlobStore::new(),
            config,
        );
        let ws = seeded(&eng);

        let err = eng
            .save_objects(&ws, "alice", vec![request("ok", b"abc"), request("big", b"abcde")])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Object #2, big data size 5 exceeds limit of 4"
        );
        // nothing landed, not even the valid first object
        assert_eq!(eng.store().list_objects_in_workspace(1).unwrap().len(), 0);
    }

    #[test]
    fn oversized_provenance_fails_the_whole_batch() {
        let mut config = EngineConfig::for_tests();
        config.max_provenance_size = 120;
        let eng = WorkspaceEngine::with_config(
            InMemoryRecordStore::new(),
            MemoryBlobStore::new(),
            config,
        );
        let ws = seeded(&eng);

        let mut req = request("obj", b"x");
        let mut action = ProvenanceAction::new();
        action.description = Some("long enough to push the document over the cap".repeat(4));
        req.provenance.actions.push(action);
        let err = eng.save_objects(&ws, "alice", vec![req]).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Object #1, obj provenance size "));
    }

    #[test]
    fn unbalanced_provenance_actions_are_rejected() {
        let eng = engine();
        let ws = seeded(&eng);

        let mut req = request("obj", b"x");
        let mut action = ProvenanceAction::new();
        action.input_objects = vec!["ws/a".to_string()];
        req.provenance.actions.push(action);
        let err = eng.save_objects(&ws, "alice", vec![req]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Object #1, obj provenance action 1 supplies 0 resolved references for 1 input objects"
        );
    }

    #[test]
    fn saving_into_a_deleted_workspace_fails() {
        let eng = engine();
        let ws = seeded(&eng);
        eng.set_workspace_deleted(&ws, true).unwrap();
        let err = eng
            .save_objects(&ws, "alice", vec![request("obj", b"x")])
            .unwrap_err();
        assert!(matches!(err, EngineError::WorkspaceDeleted(_)));
    }

    // ---- References and provenance ----

    #[test]
    fn reference_counts_add_multiplicity_across_the_batch() {
        let eng = engine();
        let ws = seeded(&eng);
        eng.save_objects(&ws, "alice", vec![request("a", b"1"), request("b", b"2")])
            .unwrap();

        let to_a = Reference::new(1, 1, 1).unwrap();
        let to_b = Reference::new(1, 2, 1).unwrap();
        let mut referrer = request("c", b"3");
        referrer.refs = vec![to_a, to_b];
        let mut action = ProvenanceAction::new();
        action.input_objects = vec!["1/1/1".to_string()];
        action.resolved_objects = vec![to_a];
        referrer.provenance.actions.push(action);
        eng.save_objects(&ws, "alice", vec![referrer]).unwrap();

        // a referenced twice (data + provenance), b once
        assert_eq!(eng.store().get_object(1, 1).unwrap().unwrap().refcounts, vec![2]);
        assert_eq!(eng.store().get_object(1, 2).unwrap().unwrap().refcounts, vec![1]);
    }

    #[test]
    fn provenance_is_stored_stripped_and_stamped() {
        let eng = engine();
        let ws = seeded(&eng);

        let target = Reference::new(9, 9, 9).unwrap();
        let mut req = request("obj", b"x");
        let mut action = ProvenanceAction::new();
        action.input_objects = vec!["9/9/9".to_string()];
        action.resolved_objects = vec![target];
        req.provenance.actions.push(action);
        eng.save_objects(&ws, "alice", vec![req]).unwrap();

        let ver = eng.store().get_version(1, 1, 1).unwrap().unwrap();
        assert_eq!(ver.provenance_refs, vec![target]);
        let prov = eng.store().get_provenance(&[ver.provenance]).unwrap()[0]
            .clone()
            .unwrap();
        assert_eq!(prov.workspace_id, Some(1));
        assert_eq!(prov.actions[0].input_objects, vec!["9/9/9".to_string()]);
        assert!(prov.actions[0].resolved_objects.is_empty());
    }

    #[test]
    fn payloads_round_trip_through_the_blob_store() {
        let eng = engine();
        let ws = seeded(&eng);
        let mut req = request("obj", b"the payload");
        req.sorted = true;
        eng.save_objects(&ws, "alice", vec![req]).unwrap();

        let got = eng
            .get_objects(&[strata_types::ObjectIdentifier::parse("ws/obj").unwrap()])
            .unwrap();
        assert_eq!(got[0].data.bytes().unwrap(), b"the payload");
        assert!(got[0].data.is_sorted());
    }
}
