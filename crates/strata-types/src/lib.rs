//! Foundation types for the Strata object store.
//!
//! This crate provides the identifier, permission, and value types shared by
//! every other Strata crate: how callers name workspaces and objects, how
//! versions point at each other, and what the store hands back.
//!
//! # Key Types
//!
//! - [`WorkspaceIdentifier`] / [`ObjectIdentifier`] — caller-supplied selectors
//!   (numeric id, name, reference string, or legacy compound form)
//! - [`Reference`] — absolute `(workspace, object, version)` pointer
//! - [`Permission`] / [`PermissionSet`] — ACL levels and computed per-user access
//! - [`Checksum`] — 128-bit content hash addressing blob payloads
//! - [`UserMetadata`] — size-bounded key/value metadata
//! - [`Provenance`] — the action lineage recorded for each saved version
//! - [`ObjectInformation`] / [`WorkspaceInformation`] — read-side records

pub mod checksum;
pub mod error;
pub mod identifier;
pub mod info;
pub mod metadata;
pub mod permission;
pub mod provenance;
pub mod reference;
pub mod status;

pub use checksum::Checksum;
pub use error::{IdKind, TypeError};
pub use identifier::{
    check_object_name, check_workspace_name, ObjectIdOrName, ObjectIdentifier,
    WorkspaceIdentifier, MAX_OBJECT_NAME_LENGTH, MAX_WORKSPACE_NAME_LENGTH,
};
pub use info::{ObjectInformation, ObjectType, WorkspaceInformation};
pub use metadata::{UserMetadata, MAX_METADATA_SIZE};
pub use permission::{Permission, PermissionSet, PermissionSetBuilder, WORLD_USER};
pub use provenance::{ExternalData, Provenance, ProvenanceAction, SubAction};
pub use reference::Reference;
pub use status::DependencyStatus;
