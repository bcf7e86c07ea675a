use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The reserved pseudo-user representing world-wide (anonymous) access.
///
/// An ACL row for this user with `Read` permission marks a workspace as
/// globally readable. Real user names can never collide with it because `*`
/// is not a legal user-name character.
pub const WORLD_USER: &str = "*";

/// Access level for a user on a workspace.
///
/// Levels form a total order: `None < Read < Write < Admin < Owner`, so
/// threshold checks are plain comparisons.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Permission {
    #[default]
    None,
    Read,
    Write,
    Admin,
    Owner,
}

impl Permission {
    /// Single-character API code: `n`, `r`, `w`, or `a`.
    ///
    /// `Owner` has no public code (ownership is reported separately by the
    /// API layer) and returns `None`.
    pub fn api_code(&self) -> Option<char> {
        match self {
            Self::None => Some('n'),
            Self::Read => Some('r'),
            Self::Write => Some('w'),
            Self::Admin => Some('a'),
            Self::Owner => None,
        }
    }

    /// Parse a single-character API code.
    pub fn from_api_code(code: char) -> Result<Self, TypeError> {
        match code {
            'n' => Ok(Self::None),
            'r' => Ok(Self::Read),
            'w' => Ok(Self::Write),
            'a' => Ok(Self::Admin),
            other => Err(TypeError::InvalidPermissionCode(other)),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Admin => write!(f, "admin"),
            Self::Owner => write!(f, "owner"),
        }
    }
}

/// Explicit permission plus world-readability for one workspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct WorkspacePerm {
    user_perm: Permission,
    world_readable: bool,
}

/// Per-workspace permissions computed for one acting user.
///
/// For every workspace it covers, the set records the user's explicit ACL
/// permission and whether the workspace is world-readable. The *effective*
/// permission is the explicit one, upgraded to `Read` when the workspace is
/// world-readable and the explicit permission is `None`. Workspaces absent
/// from the set behave as explicit `None` / not world-readable.
///
/// Immutable once built; construct through [`PermissionSet::builder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionSet {
    user: Option<String>,
    perms: BTreeMap<u64, WorkspacePerm>,
}

impl PermissionSet {
    /// Start building a permission set for the given user (`None` =
    /// anonymous).
    pub fn builder(user: Option<String>) -> PermissionSetBuilder {
        PermissionSetBuilder {
            user,
            perms: BTreeMap::new(),
        }
    }

    /// An empty set for the given user.
    pub fn empty(user: Option<String>) -> Self {
        Self::builder(user).build()
    }

    /// The acting user, or `None` for anonymous.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Workspace ids covered by this set, ascending.
    pub fn workspaces(&self) -> impl Iterator<Item = u64> + '_ {
        self.perms.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.perms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.perms.is_empty()
    }

    pub fn contains(&self, wsid: u64) -> bool {
        self.perms.contains_key(&wsid)
    }

    /// The user's explicit ACL permission for a workspace.
    pub fn user_permission(&self, wsid: u64) -> Permission {
        self.perms
            .get(&wsid)
            .map(|p| p.user_perm)
            .unwrap_or(Permission::None)
    }

    pub fn is_world_readable(&self, wsid: u64) -> bool {
        self.perms
            .get(&wsid)
            .map(|p| p.world_readable)
            .unwrap_or(false)
    }

    /// Effective permission: explicit permission, or `Read` if the workspace
    /// is world-readable and the explicit permission is `None`.
    pub fn effective(&self, wsid: u64) -> Permission {
        match self.perms.get(&wsid) {
            Some(p) if p.user_perm == Permission::None && p.world_readable => Permission::Read,
            Some(p) => p.user_perm,
            None => Permission::None,
        }
    }

    /// True if the effective permission meets the threshold.
    pub fn has_permission(&self, wsid: u64, threshold: Permission) -> bool {
        self.effective(wsid) >= threshold
    }
}

/// Builder for [`PermissionSet`].
#[derive(Clone, Debug)]
pub struct PermissionSetBuilder {
    user: Option<String>,
    perms: BTreeMap<u64, WorkspacePerm>,
}

impl PermissionSetBuilder {
    /// Record a workspace with the user's explicit permission and
    /// world-readability. Replaces any earlier entry for the same workspace.
    pub fn with_workspace(
        mut self,
        wsid: u64,
        user_perm: Permission,
        world_readable: bool,
    ) -> Self {
        self.perms.insert(
            wsid,
            WorkspacePerm {
                user_perm,
                world_readable,
            },
        );
        self
    }

    /// Record a workspace the user cannot read at all. Used when callers ask
    /// for specific workspaces and need "no permission" distinguishable from
    /// "not in the set".
    pub fn with_unreadable_workspace(self, wsid: u64) -> Self {
        self.with_workspace(wsid, Permission::None, false)
    }

    pub fn build(self) -> PermissionSet {
        PermissionSet {
            user: self.user,
            perms: self.perms,
        }
    }
}
