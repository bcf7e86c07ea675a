/// Errors from record store operations.
///
/// The duplicate-key variants are control-flow signals as much as errors:
/// callers racing on a unique index catch them and re-resolve the winning
/// record instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The workspace name unique index rejected an insert or rename.
    #[error("workspace name {name} is already in use")]
    DuplicateWorkspaceName { name: String },

    /// The per-workspace live object name index rejected an insert,
    /// rename, or undelete.
    #[error("there is already an object in workspace {wsid} named {name}")]
    DuplicateObjectName { wsid: u64, name: String },

    /// A record the operation must update is gone.
    #[error("{0} does not exist in the record store")]
    MissingRecord(String),

    /// The backend is unreachable or a request failed in transit.
    #[error("record store communication failed: {0}")]
    Communication(String),

    /// A store-maintained invariant was found violated.
    #[error("corrupt record store: {0}")]
    Corrupt(String),
}

/// Result alias for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;
