use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IdKind, TypeError};

/// Absolute pointer to one object version.
///
/// All three components are 1-based; a zero component is never valid.
/// Serializes as the string `"workspace/object/version"`, the same form the
/// store persists in reference lists. Two references are equal iff all three
/// components match.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reference {
    pub(crate) workspace: u64,
    pub(crate) object: u64,
    pub(crate) version: u32,
}

impl Reference {
    /// Create a reference. All components must be > 0.
    pub fn new(workspace: u64, object: u64, version: u32) -> Result<Self, TypeError> {
        if workspace == 0 {
            return Err(TypeError::ZeroId {
                kind: IdKind::Workspace,
            });
        }
        if object == 0 {
            return Err(TypeError::ZeroId {
                kind: IdKind::Object,
            });
        }
        if version == 0 {
            return Err(TypeError::ZeroVersion);
        }
        Ok(Self {
            workspace,
            object,
            version,
        })
    }

    pub fn workspace(&self) -> u64 {
        self.workspace
    }

    pub fn object(&self) -> u64 {
        self.object
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.workspace, self.object, self.version)
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference({self})")
    }
}

impl FromStr for Reference {
    type Err = TypeError;

    /// Parse the strictly numeric `"ws/obj/ver"` form used in stored
    /// reference lists. Name-bearing reference strings are the identifier
    /// layer's job, not this one's.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TypeError::InvalidReference {
            reference: s.to_string(),
            reason: reason.to_string(),
        };
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 3 {
            return Err(invalid("expected exactly three / separated components"));
        }
        let workspace: u64 = parts[0]
            .parse()
            .map_err(|_| invalid("workspace component is not an integer"))?;
        let object: u64 = parts[1]
            .parse()
            .map_err(|_| invalid("object component is not an integer"))?;
        let version: u32 = parts[2]
            .parse()
            .map_err(|_| invalid("version component is not an integer"))?;
        Self::new(workspace, object, version)
    }
}

impl TryFrom<String> for Reference {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Reference> for String {
    fn from(r: Reference) -> Self {
        r.to_string()
    }
}
