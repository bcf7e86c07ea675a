use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::error::TypeError;
use crate::metadata::UserMetadata;
use crate::permission::Permission;
use crate::reference::Reference;

/// Fully-qualified object type: module-scoped name plus major/minor schema
/// version. Displays as `Module.Type-major.minor`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectType {
    name: String,
    major: u32,
    minor: u32,
}

impl ObjectType {
    pub fn new(name: impl Into<String>, major: u32, minor: u32) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() || name.contains('-') {
            return Err(TypeError::InvalidTypeString {
                type_string: name,
                reason: "type name must be non-empty and free of -".to_string(),
            });
        }
        Ok(Self { name, major, minor })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}", self.name, self.major, self.minor)
    }
}

impl FromStr for ObjectType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TypeError::InvalidTypeString {
            type_string: s.to_string(),
            reason: reason.to_string(),
        };
        let (name, version) = s
            .rsplit_once('-')
            .ok_or_else(|| invalid("missing - version separator"))?;
        let (major, minor) = version
            .split_once('.')
            .ok_or_else(|| invalid("version must be major.minor"))?;
        let major: u32 = major
            .parse()
            .map_err(|_| invalid("major version is not an integer"))?;
        let minor: u32 = minor
            .parse()
            .map_err(|_| invalid("minor version is not an integer"))?;
        Self::new(name, major, minor)
    }
}

impl TryFrom<String> for ObjectType {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ObjectType> for String {
    fn from(t: ObjectType) -> Self {
        t.to_string()
    }
}

/// Description of one workspace, as returned to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInformation {
    pub id: u64,
    pub name: String,
    pub owner: String,
    pub moddate: DateTime<Utc>,
    /// Highest object id ever assigned in this workspace.
    pub max_object_id: u64,
    /// The asking user's effective permission.
    pub user_permission: Permission,
    pub global_read: bool,
    pub locked: bool,
    pub metadata: UserMetadata,
}

impl WorkspaceInformation {
    /// Lock state as reported by the API: `unlocked`, `locked`, or
    /// `published` (locked and world-readable).
    pub fn lock_state(&self) -> &'static str {
        if !self.locked {
            "unlocked"
        } else if self.global_read {
            "published"
        } else {
            "locked"
        }
    }
}

/// Description of one object version, as returned to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInformation {
    pub object_id: u64,
    pub name: String,
    pub object_type: ObjectType,
    pub saved: DateTime<Utc>,
    pub version: u32,
    pub saved_by: String,
    pub workspace_id: u64,
    pub workspace_name: String,
    pub checksum: Checksum,
    /// Canonical byte size of the stored payload.
    pub size: u64,
    /// Version metadata; omitted by listing paths unless requested.
    pub metadata: Option<UserMetadata>,
}

impl ObjectInformation {
    /// The absolute reference to this exact version.
    pub fn reference(&self) -> Reference {
        Reference {
            workspace: self.workspace_id,
            object: self.object_id,
            version: self.version,
        }
    }
}
