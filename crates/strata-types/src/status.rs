use serde::{Deserialize, Serialize};

/// Health of one storage dependency.
///
/// Status probes never fail: an unreachable dependency is reported as a
/// record with `ok = false` rather than an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub ok: bool,
    pub status: String,
    pub name: String,
    pub version: String,
}

impl DependencyStatus {
    /// A healthy dependency.
    pub fn up(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            ok: true,
            status: "OK".to_string(),
            name: name.into(),
            version: version.into(),
        }
    }

    /// An unhealthy dependency with a failure message.
    pub fn down(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            status: message.into(),
            name: name.into(),
            version: "Unknown".to_string(),
        }
    }
}
