//! The Strata workspace engine: versioned, access-controlled storage
//! for typed objects.
//!
//! [`WorkspaceEngine`] composes a record store (the versioned catalog)
//! and a blob store (the payload bytes) into the operations a data
//! platform needs: create and administer workspaces, save batches of
//! pre-validated objects, fetch payloads under data-volume budgets,
//! copy, revert and clone, list across every readable workspace, and
//! update metadata.
//!
//! # Method Groups
//!
//! The engine is one facade with its methods split across modules:
//!
//! - [`workspace`] -- create, describe, rename, lock, delete, transfer
//! - [`acl`] -- permission grants and [`PermissionSet`] construction
//! - [`save`] -- the batch save pipeline ([`SaveRequest`])
//! - [`read`] -- payload and information fetches ([`ObjectData`])
//! - [`object`] -- delete, hide and rename objects
//! - [`copy`] -- copy, revert and workspace cloning
//! - [`list`] -- cross-workspace listing ([`ListObjectsParams`])
//! - [`meta`] -- workspace and admin metadata ([`MetadataUpdate`])
//!
//! # Consistency Model
//!
//! There is no in-process locking and no multi-record transaction; the
//! record store's single-record atomic operations are the only
//! synchronization points. Counters are incremented before the records
//! they number are written, and every read path treats a counted but
//! missing record as "not yet visible" rather than an error. Name
//! collisions between concurrent writers resolve by re-reading the
//! winner, never by failing the loser outright.
//!
//! [`PermissionSet`]: strata_types::PermissionSet

pub mod acl;
pub mod config;
pub mod copy;
pub mod engine;
pub mod error;
pub mod list;
pub mod meta;
pub mod object;
pub mod read;
pub mod resolver;
pub mod save;
pub mod workspace;

pub use config::{EngineConfig, MAX_DESCRIPTION_LENGTH};
pub use engine::WorkspaceEngine;
pub use error::{EngineError, EngineResult};
pub use list::{ListObjectsParams, MAX_LISTED_OBJECTS};
pub use meta::MetadataUpdate;
pub use read::ObjectData;
pub use resolver::{ResolveFlags, ResolvedObject, ResolvedWorkspace};
pub use save::SaveRequest;
