//! Record persistence for the Strata object store.
//!
//! This crate holds the document-shaped records behind workspaces --
//! workspace containers, object containers, immutable versions, ACL
//! entries and provenance documents -- and the [`RecordStore`] trait that
//! backends implement to persist them.
//!
//! # Record Types
//!
//! - [`WorkspaceRecord`] -- one workspace container, with its object id
//!   counter
//! - [`ObjectRecord`] -- one object container: name, flags, version
//!   counter, per-version reference counts
//! - [`VersionRecord`] -- one immutable version of an object
//! - [`AclRecord`] -- one explicit (workspace, user) permission entry
//!
//! # Backends
//!
//! All backends implement the [`RecordStore`] trait:
//!
//! - [`InMemoryRecordStore`] -- map-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Every operation is atomic on exactly one record; there are no
//!    multi-record transactions.
//! 2. Unique-index races surface as typed duplicate errors, and the
//!    loser re-reads the winning record.
//! 3. Counters may run ahead of the records they number; readers treat
//!    a counted-but-missing record as not yet visible.
//! 4. Version records are immutable once inserted, except for their
//!    administrative metadata.
//! 5. The store never interprets object content; blobs live elsewhere.

pub mod error;
pub mod memory;
pub mod records;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryRecordStore;
pub use records::{
    truncate_to_millis, AclRecord, ObjectRecord, VersionRecord, WorkspaceRecord,
};
pub use traits::{MetadataTarget, RecordStore, TypeFilter, VersionFilter};
