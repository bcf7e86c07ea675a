//! Permission computation and mutation.
//!
//! Permissions are explicit per-(workspace, user) rows plus a world
//! pseudo-user row for public read. The engine computes effective
//! permissions; whether a caller is *allowed* an operation is decided by
//! the layer that authenticated them.

use std::collections::{BTreeMap, HashSet};

use strata_blobs::BlobStore;
use strata_store::{RecordStore, StoreError};
use strata_types::{
    check_workspace_name, Permission, PermissionSet, WorkspaceIdentifier, WorkspaceInformation,
    WORLD_USER,
};
use tracing::debug;

use crate::engine::WorkspaceEngine;
use crate::error::{EngineError, EngineResult};

impl<S: RecordStore, B: BlobStore> WorkspaceEngine<S, B> {
    // ---- Permission computation ----

    /// The user's explicit permission and world-readability for each
    /// listed workspace. `None` is the anonymous user, whose only
    /// access is world-readability.
    pub fn permissions_for(
        &self,
        user: Option<&str>,
        wsis: &[WorkspaceIdentifier],
    ) -> EngineResult<PermissionSet> {
        let mut builder = PermissionSet::builder(user.map(String::from));
        for wsi in wsis {
            let ws = self.resolve_workspace(wsi)?;
            let user_perm = match user {
                Some(user) => self.store.get_acl(ws.id, user)?.unwrap_or(Permission::None),
                None => Permission::None,
            };
            let world = self.world_readable(ws.id)?;
            builder = builder.with_workspace(ws.id, user_perm, world);
        }
        Ok(builder.build())
    }

    /// Every workspace where the user's effective permission meets
    /// `minimum`, floored at read. With `exclude_world`, workspaces the
    /// user sees only through world-readability are left out.
    ///
    /// This is purely an ACL computation: deleted workspaces keep their
    /// rows and appear here, and clone targets have no rows yet and do
    /// not. Record-level filtering is the lister's job.
    pub fn accessible_workspaces(
        &self,
        user: Option<&str>,
        minimum: Permission,
        exclude_world: bool,
    ) -> EngineResult<PermissionSet> {
        let floor = minimum.max(Permission::Read);
        let world_ids: HashSet<u64> = self
            .store
            .get_acls_for_user(WORLD_USER)?
            .into_iter()
            .filter(|row| row.permission >= Permission::Read)
            .map(|row| row.workspace_id)
            .collect();
        let mut builder = PermissionSet::builder(user.map(String::from));
        let mut explicit = HashSet::new();
        if let Some(user) = user {
            for row in self.store.get_acls_for_user(user)? {
                if row.permission >= floor {
                    explicit.insert(row.workspace_id);
                    builder = builder.with_workspace(
                        row.workspace_id,
                        row.permission,
                        world_ids.contains(&row.workspace_id),
                    );
                }
            }
        }
        if !exclude_world && floor == Permission::Read {
            for wsid in &world_ids {
                if !explicit.contains(wsid) {
                    builder = builder.with_workspace(*wsid, Permission::None, true);
                }
            }
        }
        Ok(builder.build())
    }

    /// Every explicit ACL row on one workspace, the world pseudo-user
    /// included, keyed by user.
    pub fn all_workspace_permissions(
        &self,
        wsi: &WorkspaceIdentifier,
    ) -> EngineResult<BTreeMap<String, Permission>> {
        let ws = self.resolve_workspace(wsi)?;
        let mut out = BTreeMap::new();
        for row in self.store.get_all_acls_for_workspace(ws.id)? {
            out.insert(row.user, row.permission);
        }
        Ok(out)
    }

    pub(crate) fn world_readable(&self, workspace_id: u64) -> EngineResult<bool> {
        Ok(self
            .store
            .get_acl(workspace_id, WORLD_USER)?
            .map(|p| p >= Permission::Read)
            .unwrap_or(false))
    }

    // ---- Permission mutation ----

    /// Set the listed users' explicit permission on a workspace.
    /// `Permission::None` removes the row. The owner's permission is
    /// never changed; owners appearing in the list are skipped. The
    /// modification date is not touched.
    pub fn set_permissions(
        &self,
        wsi: &WorkspaceIdentifier,
        users: &[String],
        permission: Permission,
    ) -> EngineResult<()> {
        if users.is_empty() {
            return Err(EngineError::IllegalArgument(
                "The users list may not be empty".to_string(),
            ));
        }
        if permission >= Permission::Owner {
            return Err(EngineError::IllegalArgument(
                "Cannot set owner permission".to_string(),
            ));
        }
        let ws = self.resolve_workspace(wsi)?;
        let rec = self.store.get_workspace_by_id(ws.id)?.ok_or_else(|| {
            EngineError::Corrupt(format!(
                "Workspace {} was unexpectedly deleted from the database",
                ws.id
            ))
        })?;
        for user in users {
            if *user == rec.owner {
                // the owner's row is fixed for the workspace's lifetime
                continue;
            }
            if permission == Permission::None {
                self.store.remove_acl(ws.id, user)?;
            } else {
                self.store.set_acl(ws.id, user, permission)?;
            }
        }
        debug!(workspace = ws.id, %permission, users = users.len(), "permissions set");
        Ok(())
    }

    /// Make a workspace world-readable, or private again with
    /// `Permission::None`. Global permissions never exceed read.
    pub fn set_global_permission(
        &self,
        wsi: &WorkspaceIdentifier,
        permission: Permission,
    ) -> EngineResult<()> {
        if permission > Permission::Read {
            return Err(EngineError::IllegalArgument(
                "Global permissions cannot be greater than read".to_string(),
            ));
        }
        let ws = self.resolve_workspace(wsi)?;
        if permission == Permission::None {
            self.store.remove_acl(ws.id, WORLD_USER)?;
        } else {
            self.store.set_acl(ws.id, WORLD_USER, permission)?;
        }
        Ok(())
    }

    /// Transfer ownership of a workspace.
    ///
    /// The old owner's ACL row drops to admin and the new owner's
    /// becomes owner. Naming: an explicit `new_name` is validated
    /// against the new owner's `user:` prefix rule and applied; without
    /// one, a current name carrying any `user:` prefix is re-prefixed
    /// for the new owner, and an unprefixed name is kept.
    pub fn set_workspace_owner(
        &self,
        wsi: &WorkspaceIdentifier,
        new_owner: &str,
        new_name: Option<String>,
    ) -> EngineResult<WorkspaceInformation> {
        let ws = self.resolve_workspace(wsi)?;
        if self.store.get_acl(ws.id, new_owner)? == Some(Permission::Owner) {
            return Err(EngineError::IllegalArgument(format!(
                "{new_owner} already owns workspace {}",
                ws.name
            )));
        }
        let rec = self.store.get_workspace_by_id(ws.id)?.ok_or_else(|| {
            EngineError::Corrupt(format!(
                "Workspace {} was unexpectedly deleted from the database",
                ws.id
            ))
        })?;
        let old_owner = rec.owner;
        let new_name = match new_name {
            None => ws
                .name
                .split_once(':')
                .map(|(_, rest)| format!("{new_owner}:{rest}")),
            Some(name) if name == ws.name => None,
            Some(name) => {
                check_workspace_name(&name, Some(new_owner))?;
                Some(name)
            }
        };
        let now = Self::now();
        if let Some(name) = &new_name {
            match self.store.rename_workspace(ws.id, name, now) {
                Err(StoreError::DuplicateWorkspaceName { name }) => {
                    return Err(EngineError::IllegalArgument(format!(
                        "There is already a workspace named {name}"
                    )));
                }
                other => other?,
            }
        }
        self.store.set_workspace_owner(ws.id, new_owner, now)?;
        self.store.set_acl(ws.id, &old_owner, Permission::Admin)?;
        self.store.set_acl(ws.id, new_owner, Permission::Owner)?;
        debug!(workspace = ws.id, old_owner, new_owner, "workspace owner changed");
        self.workspace_information(&WorkspaceIdentifier::Id(ws.id), Some(new_owner))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
