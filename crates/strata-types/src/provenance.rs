use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reference::Reference;

/// The recorded lineage of the actions that produced one object version.
///
/// Every saved version gets its own provenance document, even when several
/// versions in a batch share the same logical lineage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// User the provenance was recorded for.
    pub user: String,
    /// When the lineage was recorded.
    pub date: DateTime<Utc>,
    /// Workspace the objects were saved from, enabling relative references
    /// in `input_objects` to be interpreted later.
    pub workspace_id: Option<u64>,
    /// Ordered actions, earliest first.
    pub actions: Vec<ProvenanceAction>,
}

impl Provenance {
    pub fn new(user: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            user: user.into(),
            date,
            workspace_id: None,
            actions: Vec::new(),
        }
    }

    /// Total number of declared input objects across all actions.
    ///
    /// Outgoing provenance references are stored flattened on the version
    /// record in exactly this order and count; readers redistribute them
    /// across actions using each action's own count.
    pub fn input_object_count(&self) -> usize {
        self.actions.iter().map(|a| a.input_objects.len()).sum()
    }

    /// All resolved input references across actions, flattened in action
    /// order.
    pub fn flattened_resolved_refs(&self) -> Vec<Reference> {
        self.actions
            .iter()
            .flat_map(|a| a.resolved_objects.iter().copied())
            .collect()
    }
}

/// One step in a provenance chain: what ran, with which parameters, reading
/// which objects.
///
/// Every field is optional from the caller's point of view; an empty action
/// is legal if uninformative.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceAction {
    /// When this action ran.
    pub time: Option<DateTime<Utc>>,
    /// The calling context (e.g. a service or UI) that triggered the action.
    pub caller: Option<String>,
    pub service: Option<String>,
    pub service_version: Option<String>,
    pub method: Option<String>,
    /// Parameters passed to the method, as opaque JSON.
    pub method_params: Vec<serde_json::Value>,
    pub script: Option<String>,
    pub script_version: Option<String>,
    pub command_line: Option<String>,
    /// Input objects as supplied by the caller: reference strings, possibly
    /// by name and possibly versionless.
    pub input_objects: Vec<String>,
    /// `input_objects` resolved to absolute references, in the same order.
    /// Empty until resolution (at save) or redistribution (at read).
    pub resolved_objects: Vec<Reference>,
    pub intermediate_incoming: Vec<String>,
    pub intermediate_outgoing: Vec<String>,
    pub external_data: Vec<ExternalData>,
    pub subactions: Vec<SubAction>,
    pub custom: BTreeMap<String, String>,
    pub description: Option<String>,
}

impl ProvenanceAction {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A reference to data external to the store that contributed to an action.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalData {
    pub resource_name: Option<String>,
    pub resource_url: Option<String>,
    pub resource_version: Option<String>,
    pub resource_release_date: Option<DateTime<Utc>>,
    pub data_url: Option<String>,
    pub data_id: Option<String>,
    pub description: Option<String>,
}

/// A piece of code an action invoked below the level of a whole service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAction {
    pub name: Option<String>,
    pub ver: Option<String>,
    pub code_url: Option<String>,
    pub commit: Option<String>,
    pub endpoint_url: Option<String>,
}
