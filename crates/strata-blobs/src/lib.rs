//! Content-addressed blob storage for object payloads.
//!
//! Record stores keep the versioned catalog; the bytes themselves land
//! here, keyed by payload checksum. Two backends implement the same
//! [`BlobStore`] trait:
//!
//! - [`MemoryBlobStore`] holds everything in a map, for tests and
//!   ephemeral deployments.
//! - [`FsBlobStore`] persists blobs as files fanned out under a root
//!   directory.
//!
//! # Handles
//!
//! Reads go through a [`ByteCacheManager`], which enforces per-call
//! memory and disk budgets and hands back [`ByteCache`] handles that
//! are either resident or spilled to a temp file.
//!
//! # Design Rules
//!
//! 1. Saving is idempotent: the checksum determines the content, so a
//!    repeat save (or a lost race) is a success, and the first write
//!    wins.
//! 2. Blobs are immutable once written. Changing data means a new
//!    checksum, never an overwrite.
//! 3. A missing blob on read is an error; a missing blob on remove is
//!    not.
//! 4. Backends report health through [`status`](BlobStore::status) and
//!    never panic doing it.

pub mod error;
pub mod fs;
pub mod handle;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{BlobError, BlobResult};
pub use fs::FsBlobStore;
pub use handle::{ByteCache, ByteCacheManager};
pub use memory::MemoryBlobStore;
pub use traits::BlobStore;
