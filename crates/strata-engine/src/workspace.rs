//! Workspace lifecycle and administration.

use strata_blobs::BlobStore;
use strata_store::{RecordStore, StoreError, WorkspaceRecord};
use strata_types::{
    check_workspace_name, Permission, UserMetadata, WorkspaceIdentifier, WorkspaceInformation,
    WORLD_USER,
};
use tracing::{debug, info};

use crate::config::MAX_DESCRIPTION_LENGTH;
use crate::engine::WorkspaceEngine;
use crate::error::{EngineError, EngineResult};

/// Truncate a description to the stored maximum. Over-long input is
/// cut, not rejected.
fn prune_description(description: Option<String>) -> Option<String> {
    description.map(|d| {
        if d.chars().count() > MAX_DESCRIPTION_LENGTH {
            d.chars().take(MAX_DESCRIPTION_LENGTH).collect()
        } else {
            d
        }
    })
}

impl<S: RecordStore, B: BlobStore> WorkspaceEngine<S, B> {
    // ---- Creation ----

    /// Create a workspace owned by `owner`.
    ///
    /// The name is validated against the owner's `user:` prefix rule and
    /// claimed atomically; losing a name race surfaces as
    /// [`PreExistingWorkspace`](EngineError::PreExistingWorkspace). The
    /// owner gets an owner ACL row, and `global_read` adds a world read
    /// row.
    pub fn create_workspace(
        &self,
        owner: &str,
        name: &str,
        global_read: bool,
        description: Option<String>,
        metadata: UserMetadata,
    ) -> EngineResult<WorkspaceInformation> {
        check_workspace_name(name, Some(owner))?;
        self.create_workspace_record(owner, name, global_read, description, metadata, false)
    }

    /// Shared creation path for ordinary workspaces and clone targets.
    ///
    /// A clone target is inserted without a name so it stays invisible
    /// until the clone commits, but the requested name is still checked
    /// up front to fail cheap name collisions before any copying starts.
    /// Clone targets also defer their ACL rows to the commit.
    pub(crate) fn create_workspace_record(
        &self,
        owner: &str,
        name: &str,
        global_read: bool,
        description: Option<String>,
        metadata: UserMetadata,
        cloning: bool,
    ) -> EngineResult<WorkspaceInformation> {
        if let Some(existing) = self.store.get_workspace_by_name(name)? {
            let mut err = format!("Workspace name {name} is already in use");
            if existing.deleted && existing.owner == owner {
                err.push_str(" by a deleted workspace");
            }
            return Err(EngineError::PreExistingWorkspace(err));
        }
        let id = self.store.next_workspace_id()?;
        let now = Self::now();
        let record_name = if cloning { None } else { Some(name.to_string()) };
        let mut rec = WorkspaceRecord::new(id, record_name, owner, now);
        rec.description = prune_description(description);
        rec.metadata = metadata.clone();
        match self.store.insert_workspace(rec) {
            Err(StoreError::DuplicateWorkspaceName { name }) => {
                return Err(EngineError::PreExistingWorkspace(format!(
                    "Workspace name {name} is already in use"
                )));
            }
            other => other?,
        }
        if !cloning {
            self.store.set_acl(id, owner, Permission::Owner)?;
            if global_read {
                self.store.set_acl(id, WORLD_USER, Permission::Read)?;
            }
        }
        info!(workspace = id, name, owner, cloning, "workspace created");
        Ok(WorkspaceInformation {
            id,
            name: name.to_string(),
            owner: owner.to_string(),
            moddate: now,
            max_object_id: 0,
            user_permission: Permission::Owner,
            global_read,
            locked: false,
            metadata,
        })
    }

    // ---- Information ----

    /// Describe one workspace from `user`'s point of view.
    pub fn workspace_information(
        &self,
        wsi: &WorkspaceIdentifier,
        user: Option<&str>,
    ) -> EngineResult<WorkspaceInformation> {
        let ws = self.resolve_workspace(wsi)?;
        let rec = self.store.get_workspace_by_id(ws.id)?.ok_or_else(|| {
            EngineError::Corrupt(format!(
                "Workspace {} was unexpectedly deleted from the database",
                ws.id
            ))
        })?;
        self.info_from_record(&rec, user)
    }

    pub(crate) fn info_from_record(
        &self,
        rec: &WorkspaceRecord,
        user: Option<&str>,
    ) -> EngineResult<WorkspaceInformation> {
        let name = rec
            .name
            .clone()
            .ok_or_else(|| EngineError::Corrupt(format!("workspace {} has no name", rec.id)))?;
        let user_permission = match user {
            Some(user) => self.store.get_acl(rec.id, user)?.unwrap_or(Permission::None),
            None => Permission::None,
        };
        Ok(WorkspaceInformation {
            id: rec.id,
            name,
            owner: rec.owner.clone(),
            moddate: rec.moddate,
            max_object_id: rec.max_object_id,
            user_permission,
            global_read: self.world_readable(rec.id)?,
            locked: rec.locked,
            metadata: rec.metadata.clone(),
        })
    }

    /// Workspaces visible to `user` at `minimum` permission or better,
    /// ordered by id.
    ///
    /// Deleted workspaces are omitted unless `show_deleted`;
    /// `show_only_deleted` inverts the filter to deleted workspaces
    /// only. Clone targets are never listed.
    pub fn list_workspaces(
        &self,
        user: Option<&str>,
        minimum: Permission,
        exclude_world: bool,
        show_deleted: bool,
        show_only_deleted: bool,
    ) -> EngineResult<Vec<WorkspaceInformation>> {
        let pset = self.accessible_workspaces(user, minimum, exclude_world)?;
        let mut out = Vec::new();
        for wsid in pset.workspaces() {
            // rows can outlive their workspace record briefly; skip strays
            let rec = match self.store.get_workspace_by_id(wsid)? {
                Some(rec) => rec,
                None => continue,
            };
            if rec.name.is_none() {
                continue;
            }
            if show_only_deleted {
                if !rec.deleted {
                    continue;
                }
            } else if rec.deleted && !show_deleted {
                continue;
            }
            let mut info = self.info_from_record(&rec, user)?;
            info.user_permission = pset.user_permission(wsid);
            info.global_read = pset.is_world_readable(wsid);
            out.push(info);
        }
        Ok(out)
    }

    /// The workspace's free-form description.
    pub fn workspace_description(&self, wsi: &WorkspaceIdentifier) -> EngineResult<Option<String>> {
        let ws = self.resolve_workspace(wsi)?;
        let rec = self.store.get_workspace_by_id(ws.id)?.ok_or_else(|| {
            EngineError::Corrupt(format!(
                "Workspace {} was unexpectedly deleted from the database",
                ws.id
            ))
        })?;
        Ok(rec.description)
    }

    // ---- Mutation ----

    /// Soft-delete or restore a workspace, cascading over its objects.
    ///
    /// Deleting marks every object deleted before the workspace itself,
    /// so a deleted workspace never holds live objects. Restoring flips
    /// the workspace first, then its objects; an object whose name was
    /// reused while it was deleted stays deleted rather than failing
    /// the restore.
    pub fn set_workspace_deleted(
        &self,
        wsi: &WorkspaceIdentifier,
        delete: bool,
    ) -> EngineResult<()> {
        let ws = if delete {
            self.resolve_workspace(wsi)?
        } else {
            self.resolve_workspace_allow_deleted(wsi)?
        };
        let now = Self::now();
        if delete {
            self.set_all_objects_deleted(ws.id, true, now)?;
        }
        self.store.set_workspace_deleted(ws.id, delete, now)?;
        if !delete {
            self.set_all_objects_deleted(ws.id, false, now)?;
        }
        info!(workspace = ws.id, delete, "workspace delete flag set");
        Ok(())
    }

    fn set_all_objects_deleted(
        &self,
        workspace_id: u64,
        delete: bool,
        now: chrono::DateTime<chrono::Utc>,
    ) -> EngineResult<()> {
        for rec in self.store.list_objects_in_workspace(workspace_id)? {
            if rec.deleted == delete {
                continue;
            }
            match self.store.set_object_deleted(workspace_id, rec.id, delete, now) {
                Err(StoreError::DuplicateObjectName { wsid, name }) => {
                    // another object claimed the name while this one was
                    // deleted; leave the loser deleted
                    debug!(
                        workspace = wsid,
                        object = rec.id,
                        name,
                        "name taken, object left deleted during workspace restore"
                    );
                }
                other => other?,
            }
        }
        Ok(())
    }

    /// Lock a workspace permanently. There is no unlock; a locked
    /// workspace accepts no further mutation except becoming
    /// world-readable, which the calling layer enforces.
    pub fn lock_workspace(
        &self,
        wsi: &WorkspaceIdentifier,
        user: Option<&str>,
    ) -> EngineResult<WorkspaceInformation> {
        let ws = self.resolve_workspace(wsi)?;
        self.store.lock_workspace(ws.id)?;
        info!(workspace = ws.id, "workspace locked");
        self.workspace_information(&WorkspaceIdentifier::Id(ws.id), user)
    }

    /// Rename a workspace. The new name is validated against the
    /// owner's `user:` prefix rule.
    pub fn rename_workspace(
        &self,
        wsi: &WorkspaceIdentifier,
        new_name: &str,
    ) -> EngineResult<WorkspaceInformation> {
        let ws = self.resolve_workspace(wsi)?;
        let rec = self.store.get_workspace_by_id(ws.id)?.ok_or_else(|| {
            EngineError::Corrupt(format!(
                "Workspace {} was unexpectedly deleted from the database",
                ws.id
            ))
        })?;
        check_workspace_name(new_name, Some(&rec.owner))?;
        if new_name == ws.name {
            return Err(EngineError::IllegalArgument(format!(
                "Workspace is already named {new_name}"
            )));
        }
        match self.store.rename_workspace(ws.id, new_name, Self::now()) {
            Err(StoreError::DuplicateWorkspaceName { name }) => {
                return Err(EngineError::IllegalArgument(format!(
                    "There is already a workspace named {name}"
                )));
            }
            other => other?,
        }
        debug!(workspace = ws.id, old = %ws.name, new = new_name, "workspace renamed");
        self.workspace_information(&WorkspaceIdentifier::Id(ws.id), None)
    }

    /// Set or clear the workspace description. Input longer than
    /// [`MAX_DESCRIPTION_LENGTH`] characters is truncated.
    pub fn set_workspace_description(
        &self,
        wsi: &WorkspaceIdentifier,
        description: Option<String>,
    ) -> EngineResult<()> {
        let ws = self.resolve_workspace(wsi)?;
        self.store
            .set_workspace_description(ws.id, prune_description(description), Self::now())?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
