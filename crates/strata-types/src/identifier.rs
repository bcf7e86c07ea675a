use std::fmt;

use crate::error::{IdKind, TypeError};

/// Maximum length of a workspace name, in bytes.
pub const MAX_WORKSPACE_NAME_LENGTH: usize = 100;
/// Maximum length of an object name, in bytes.
pub const MAX_OBJECT_NAME_LENGTH: usize = 255;
/// Separates an owning user name from the rest of a workspace name.
const WS_NAME_DELIMITER: char = ':';
/// Prefix of the legacy compound identifier forms (`kb|ws.4`,
/// `kb|ws.4.obj.5.ver.6`).
const LEGACY_PREFIX: &str = "kb|ws.";

fn is_unsigned_integer(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_integer(s: &str) -> bool {
    is_unsigned_integer(s.strip_prefix('-').unwrap_or(s))
}

/// Check that a workspace name is syntactically valid.
///
/// Rules: non-empty, at most [`MAX_WORKSPACE_NAME_LENGTH`] bytes, characters
/// limited to `[A-Za-z0-9_]` plus at most one `:` delimiter, not an integer.
/// When `user` is given (workspace creation), a delimited name must carry
/// exactly that user's name before the delimiter.
///
/// ```
/// use strata_types::check_workspace_name;
///
/// assert!(check_workspace_name("my_workspace", None).is_ok());
/// assert!(check_workspace_name("alice:scratch", Some("alice")).is_ok());
/// assert!(check_workspace_name("alice:scratch", Some("bob")).is_err());
/// assert!(check_workspace_name("bad name", None).is_err());
/// ```
pub fn check_workspace_name(name: &str, user: Option<&str>) -> Result<(), TypeError> {
    let illegal = |reason: String| TypeError::IllegalWorkspaceName {
        name: name.to_string(),
        reason,
    };
    if name.is_empty() {
        return Err(illegal("name cannot be empty".to_string()));
    }
    if name.len() > MAX_WORKSPACE_NAME_LENGTH {
        return Err(illegal(format!(
            "name exceeds the maximum length of {MAX_WORKSPACE_NAME_LENGTH}"
        )));
    }
    let delims = name.matches(WS_NAME_DELIMITER).count();
    if delims > 1 {
        return Err(illegal(format!(
            "name may only contain one {WS_NAME_DELIMITER} delimiter"
        )));
    }
    if delims == 1 {
        let (prefix, rest) = name
            .split_once(WS_NAME_DELIMITER)
            .unwrap_or((name, ""));
        if prefix.is_empty() {
            return Err(illegal(format!(
                "user name missing before the {WS_NAME_DELIMITER} delimiter"
            )));
        }
        if rest.is_empty() {
            return Err(illegal(format!(
                "workspace name missing after the {WS_NAME_DELIMITER} delimiter"
            )));
        }
        if let Some(user) = user {
            if prefix != user {
                return Err(illegal(format!(
                    "name must only contain the user name {user} before the \
                     {WS_NAME_DELIMITER} delimiter"
                )));
            }
        }
    }
    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != WS_NAME_DELIMITER)
    {
        return Err(illegal(format!("illegal character {c:?}")));
    }
    if is_unsigned_integer(name) {
        return Err(illegal("workspace names cannot be integers".to_string()));
    }
    Ok(())
}

/// Check that an object name is syntactically valid.
///
/// Rules: non-empty, at most [`MAX_OBJECT_NAME_LENGTH`] bytes, characters
/// limited to `[A-Za-z0-9_.|-]`, not an integer.
pub fn check_object_name(name: &str) -> Result<(), TypeError> {
    let illegal = |reason: String| TypeError::IllegalObjectName {
        name: name.to_string(),
        reason,
    };
    if name.is_empty() {
        return Err(illegal("name cannot be empty".to_string()));
    }
    if name.len() > MAX_OBJECT_NAME_LENGTH {
        return Err(illegal(format!(
            "name exceeds the maximum length of {MAX_OBJECT_NAME_LENGTH}"
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '.' | '|' | '-'))
    {
        return Err(illegal(format!("illegal character {c:?}")));
    }
    if is_integer(name) {
        return Err(illegal("object names cannot be integers".to_string()));
    }
    Ok(())
}

/// Workspace selector supplied by a caller: numeric id or unique name.
///
/// Constructors validate their input. [`WorkspaceIdentifier::parse`]
/// additionally accepts a bare integer and the legacy `kb|ws.<id>` compound
/// form, normalizing both to the id variant; integers are never treated as
/// names, which is why integer workspace names are illegal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkspaceIdentifier {
    Id(u64),
    Name(String),
}

impl WorkspaceIdentifier {
    /// Select a workspace by numeric id (must be > 0).
    pub fn from_id(id: u64) -> Result<Self, TypeError> {
        if id == 0 {
            return Err(TypeError::ZeroId {
                kind: IdKind::Workspace,
            });
        }
        Ok(Self::Id(id))
    }

    /// Select a workspace by name. The name is validated syntactically; no
    /// ownership-prefix check is applied here.
    pub fn from_name(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        check_workspace_name(&name, None)?;
        Ok(Self::Name(name))
    }

    /// Parse a workspace identifier string: integer id, `kb|ws.<id>`, or
    /// bare name.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if let Some(digits) = s.strip_prefix(LEGACY_PREFIX) {
            if let Ok(id) = digits.parse::<u64>() {
                return Self::from_id(id);
            }
            // Not the legacy form after all; the name check below rejects
            // the | character with a precise error.
        }
        if is_unsigned_integer(s) {
            let id = s.parse::<u64>().map_err(|_| TypeError::IllegalWorkspaceName {
                name: s.to_string(),
                reason: "workspace id out of range".to_string(),
            })?;
            return Self::from_id(id);
        }
        Self::from_name(s)
    }

    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Name(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Name(name) => Some(name),
        }
    }
}

impl fmt::Display for WorkspaceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Object selector within a workspace: numeric id or name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectIdOrName {
    Id(u64),
    Name(String),
}

impl ObjectIdOrName {
    /// Select an object by numeric id (must be > 0).
    pub fn from_id(id: u64) -> Result<Self, TypeError> {
        if id == 0 {
            return Err(TypeError::ZeroId {
                kind: IdKind::Object,
            });
        }
        Ok(Self::Id(id))
    }

    /// Select an object by validated name.
    pub fn from_name(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        check_object_name(&name)?;
        Ok(Self::Name(name))
    }

    /// Parse an object selector string: integer id or bare name.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if is_unsigned_integer(s) {
            let id = s.parse::<u64>().map_err(|_| TypeError::IllegalObjectName {
                name: s.to_string(),
                reason: "object id out of range".to_string(),
            })?;
            return Self::from_id(id);
        }
        Self::from_name(s)
    }

    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Name(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Name(name) => Some(name),
        }
    }
}

impl fmt::Display for ObjectIdOrName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Full object selector: a workspace, an object id-or-name, and an optional
/// version. Without a version the selector means "the latest version".
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectIdentifier {
    workspace: WorkspaceIdentifier,
    object: ObjectIdOrName,
    version: Option<u32>,
}

impl ObjectIdentifier {
    /// Select the latest version of an object.
    pub fn new(workspace: WorkspaceIdentifier, object: ObjectIdOrName) -> Self {
        Self {
            workspace,
            object,
            version: None,
        }
    }

    /// Select a specific version (must be > 0).
    pub fn with_version(
        workspace: WorkspaceIdentifier,
        object: ObjectIdOrName,
        version: u32,
    ) -> Result<Self, TypeError> {
        if version == 0 {
            return Err(TypeError::ZeroVersion);
        }
        Ok(Self {
            workspace,
            object,
            version: Some(version),
        })
    }

    /// Parse an object identifier string: a `ws/obj[/ver]` reference or the
    /// legacy `kb|ws.<ws>.obj.<obj>[.ver.<ver>]` compound form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.starts_with(LEGACY_PREFIX) {
            Self::parse_legacy(s)
        } else {
            Self::parse_ref(s)
        }
    }

    /// Parse a `ws/obj[/ver]` reference string. The workspace and object
    /// components may each be an integer id or a name; the version must be
    /// an integer.
    pub fn parse_ref(reference: &str) -> Result<Self, TypeError> {
        let invalid = |reason: String| TypeError::InvalidReference {
            reference: reference.to_string(),
            reason,
        };
        let parts: Vec<&str> = reference.split('/').collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(invalid(format!(
                "expected 2 or 3 / separated components, got {}",
                parts.len()
            )));
        }
        let workspace = match parts[0].parse::<u64>() {
            Ok(id) => WorkspaceIdentifier::from_id(id)?,
            Err(_) => WorkspaceIdentifier::from_name(parts[0])?,
        };
        let object = match parts[1].parse::<u64>() {
            Ok(id) => ObjectIdOrName::from_id(id)?,
            Err(_) => ObjectIdOrName::from_name(parts[1])?,
        };
        if parts.len() == 3 {
            let version: u32 = parts[2]
                .parse()
                .map_err(|_| invalid("unable to parse version component to an integer".into()))?;
            Self::with_version(workspace, object, version)
        } else {
            Ok(Self::new(workspace, object))
        }
    }

    fn parse_legacy(s: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidReference {
            reference: s.to_string(),
            reason: reason.to_string(),
        };
        let rest = s
            .strip_prefix(LEGACY_PREFIX)
            .ok_or_else(|| invalid("missing kb|ws. prefix"))?;
        let (ws_part, obj_rest) = rest
            .split_once(".obj.")
            .ok_or_else(|| invalid("missing .obj. segment"))?;
        let wsid: u64 = ws_part
            .parse()
            .map_err(|_| invalid("workspace id is not an integer"))?;
        let (obj_part, version) = match obj_rest.split_once(".ver.") {
            Some((o, v)) => {
                let ver: u32 = v.parse().map_err(|_| invalid("version is not an integer"))?;
                (o, Some(ver))
            }
            None => (obj_rest, None),
        };
        let objid: u64 = obj_part
            .parse()
            .map_err(|_| invalid("object id is not an integer"))?;
        let workspace = WorkspaceIdentifier::from_id(wsid)?;
        let object = ObjectIdOrName::from_id(objid)?;
        match version {
            Some(v) => Self::with_version(workspace, object, v),
            None => Ok(Self::new(workspace, object)),
        }
    }

    pub fn workspace(&self) -> &WorkspaceIdentifier {
        &self.workspace
    }

    pub fn object(&self) -> &ObjectIdOrName {
        &self.object
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    pub fn into_parts(self) -> (WorkspaceIdentifier, ObjectIdOrName, Option<u32>) {
        (self.workspace, self.object, self.version)
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workspace, self.object)?;
        if let Some(v) = self.version {
            write!(f, "/{v}")?;
        }
        Ok(())
    }
}
