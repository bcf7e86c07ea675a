use strata_types::Checksum;

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// No blob is stored under the given checksum.
    #[error("Attempt to retrieve non-existant blob with chksum {0}")]
    NoSuchBlob(Checksum),

    /// The backend is unreachable or a request failed in transit.
    #[error("could not communicate with the blob backend: {0}")]
    Communication(String),

    /// A byte cache hit its on-disk budget.
    #[error("Out of disk space limit")]
    DiskLimitExceeded,

    /// I/O error from the backing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for blob store operations.
pub type BlobResult<T> = Result<T, BlobError>;
