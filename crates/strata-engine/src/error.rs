use strata_blobs::BlobError;
use strata_store::StoreError;
use strata_types::TypeError;

/// Errors from workspace engine operations.
///
/// Resolution failures distinguish records that do not exist from records
/// that exist but are flagged deleted, so callers can offer an undelete
/// path instead of a blind retry.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The addressed workspace has never existed.
    ///
    /// The argument names the failed lookup, `name foo` or `id 7`.
    #[error("No workspace with {0} exists")]
    NoSuchWorkspace(String),

    /// The addressed workspace exists but is flagged deleted.
    #[error("Workspace {0} is deleted")]
    WorkspaceDeleted(String),

    /// A workspace create or rename lost to an existing name.
    #[error("{0}")]
    PreExistingWorkspace(String),

    /// The addressed object or version does not exist.
    #[error("{0}")]
    NoSuchObject(String),

    /// The addressed object exists but is flagged deleted.
    #[error("{0}")]
    DeletedObject(String),

    /// Caller input failed validation.
    #[error("{0}")]
    IllegalArgument(String),

    /// A per-key metadata update kept losing races until its retry
    /// budget ran out.
    #[error("Failed to update metadata {attempts} times")]
    MetadataUpdateFailed { attempts: u32 },

    /// Stored records violate an engine invariant.
    #[error("corrupt workspace state: {0}")]
    Corrupt(String),

    /// A record store failure the engine does not interpret.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A blob store failure the engine does not interpret.
    #[error(transparent)]
    Blob(#[from] BlobError),

    /// A domain type rejected a value.
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
