//! Workspace metadata and per-version administrative metadata updates.
//!
//! Updates are key-at-a-time rather than whole-map writes. Each key
//! first tries to overwrite an existing entry and then to insert a new
//! one; losing both races to a concurrent writer loops back to the
//! overwrite, bounded by [`EngineConfig::metadata_update_attempts`].
//! The merged map is checked against the size limit before any key is
//! touched, so an oversized update never lands partially.
//!
//! [`EngineConfig::metadata_update_attempts`]: crate::config::EngineConfig::metadata_update_attempts

use chrono::{DateTime, Utc};
use strata_blobs::BlobStore;
use strata_store::{MetadataTarget, RecordStore};
use strata_types::{ObjectIdentifier, UserMetadata, WorkspaceIdentifier, MAX_METADATA_SIZE};
use tracing::{debug, info};

use crate::engine::WorkspaceEngine;
use crate::error::{EngineError, EngineResult};
use crate::resolver::ResolveFlags;

/// A batch of key changes for one metadata map.
///
/// Setting and removing the same key in one update is allowed but the
/// outcome is unspecified; the keys are applied independently.
#[derive(Clone, Debug, Default)]
pub struct MetadataUpdate {
    /// Keys to add or overwrite.
    pub set: UserMetadata,
    /// Keys to drop. Removing an absent key is not an error.
    pub remove: Vec<String>,
}

impl MetadataUpdate {
    fn has_update(&self) -> bool {
        !self.set.is_empty() || !self.remove.is_empty()
    }
}

impl<S: RecordStore, B: BlobStore> WorkspaceEngine<S, B> {
    /// Merge `update` into a workspace's metadata.
    ///
    /// Returns the new modification date, or `None` when the update
    /// changes nothing; a no-op leaves the modification date alone.
    pub fn update_workspace_metadata(
        &self,
        wsi: &WorkspaceIdentifier,
        update: &MetadataUpdate,
    ) -> EngineResult<Option<DateTime<Utc>>> {
        let ws = self.resolve_workspace(wsi)?;
        let rec = self.store.get_workspace_by_id(ws.id)?.ok_or_else(|| {
            EngineError::Corrupt(format!(
                "Workspace {} was unexpectedly deleted from the database",
                ws.id
            ))
        })?;
        let now = Self::now();
        let target = MetadataTarget::Workspace { workspace_id: ws.id };
        if !self.apply_metadata_update(&target, &rec.metadata, update, now)? {
            return Ok(None);
        }
        info!(workspace = ws.id, "workspace metadata updated");
        Ok(Some(now))
    }

    /// Merge administrative metadata into specific object versions.
    ///
    /// Each entry addresses one version (the latest when the identifier
    /// has none). Version records are otherwise immutable and no
    /// modification dates move. Entries apply in order; a failure
    /// reports which object it concerns and leaves earlier entries
    /// applied.
    pub fn update_admin_metadata(
        &self,
        updates: &[(ObjectIdentifier, MetadataUpdate)],
    ) -> EngineResult<()> {
        for (oi, update) in updates {
            let ws = self.resolve_workspace(oi.workspace())?;
            let res = self
                .resolve_object_in_workspace(&ws, oi.object(), oi.version(), ResolveFlags::strict())?
                .ok_or_else(|| {
                    EngineError::Corrupt(format!("strict resolution of {oi} produced no record"))
                })?;
            let ver = self
                .store
                .get_version(ws.id, res.object_id, res.version)?
                .ok_or_else(|| self.version_not_found(&res, &ws.name))?;
            let target = MetadataTarget::Version {
                workspace_id: ws.id,
                object_id: res.object_id,
                version: res.version,
            };
            let applied =
                self.apply_metadata_update(&target, &ver.admin_metadata, update, Self::now());
            match applied {
                Ok(changed) => {
                    debug!(
                        workspace = ws.id,
                        object = res.object_id,
                        version = res.version,
                        changed,
                        "admin metadata update"
                    );
                }
                Err(EngineError::IllegalArgument(msg)) => {
                    let version = match oi.version() {
                        None => "latest version".to_string(),
                        Some(v) => format!("version {v}"),
                    };
                    return Err(EngineError::IllegalArgument(format!(
                        "Error setting metadata on workspace {} id {}, object {}, {version}: {msg}",
                        ws.name,
                        ws.id,
                        oi.object(),
                    )));
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    /// Apply one update to one target map. Returns false for a no-op.
    ///
    /// The no-op answer and the size limit are decided against a merged
    /// snapshot of the current map; the store then applies keys one at
    /// a time.
    fn apply_metadata_update(
        &self,
        target: &MetadataTarget,
        current: &UserMetadata,
        update: &MetadataUpdate,
        moddate: DateTime<Utc>,
    ) -> EngineResult<bool> {
        if !update.has_update() {
            return Err(EngineError::IllegalArgument(
                "No metadata changes provided".to_string(),
            ));
        }
        let mut merged = current.clone();
        for (key, value) in update.set.iter() {
            merged.set_unchecked(key, value);
        }
        for key in &update.remove {
            merged.remove(key);
        }
        if merged == *current {
            return Ok(false);
        }
        if merged.check_size().is_err() {
            return Err(EngineError::IllegalArgument(format!(
                "Updated metadata exceeds allowed size of {MAX_METADATA_SIZE}B"
            )));
        }
        for (key, value) in update.set.iter() {
            self.update_metadata_key(target, key, value, moddate)?;
        }
        for key in &update.remove {
            self.store.remove_metadata_key(target, key, moddate)?;
        }
        Ok(true)
    }

    /// One key's optimistic update: overwrite when the key exists,
    /// insert when it does not, and loop when a racing writer removes
    /// or adds the key between the two steps.
    fn update_metadata_key(
        &self,
        target: &MetadataTarget,
        key: &str,
        value: &str,
        moddate: DateTime<Utc>,
    ) -> EngineResult<()> {
        let attempts = self.config.metadata_update_attempts;
        for attempt in 0..attempts {
            if self
                .store
                .set_metadata_key_if_present(target, key, value, moddate)?
            {
                return Ok(());
            }
            if self
                .store
                .add_metadata_key_if_absent(target, key, value, moddate)?
            {
                return Ok(());
            }
            debug!(attempt, key, "lost a metadata key race, retrying");
        }
        Err(EngineError::MetadataUpdateFailed { attempts })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
