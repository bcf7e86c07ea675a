use std::fmt;

use thiserror::Error;

/// Errors produced by identifier parsing and value-type validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid checksum length: expected {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("illegal workspace name {name}: {reason}")]
    IllegalWorkspaceName { name: String, reason: String },

    #[error("illegal object name {name}: {reason}")]
    IllegalObjectName { name: String, reason: String },

    #[error("{kind} id must be > 0")]
    ZeroId { kind: IdKind },

    #[error("object version must be > 0")]
    ZeroVersion,

    #[error("invalid reference {reference}: {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("invalid type string {type_string}: {reason}")]
    InvalidTypeString { type_string: String, reason: String },

    #[error("metadata size of {size}B exceeds maximum of {max}B")]
    MetadataTooLarge { size: usize, max: usize },

    #[error("total size of metadata key + value exceeds maximum of {max}B for key {key}")]
    OversizedMetadataEntry { key: String, max: usize },

    #[error("invalid permission code {0:?}")]
    InvalidPermissionCode(char),
}

/// Which id namespace a zero id was supplied for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Workspace,
    Object,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workspace => write!(f, "workspace"),
            Self::Object => write!(f, "object"),
        }
    }
}
