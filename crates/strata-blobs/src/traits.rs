//! The blob store abstraction.

use std::io::Read;

use strata_types::{Checksum, DependencyStatus};

use crate::error::BlobResult;
use crate::handle::{ByteCache, ByteCacheManager};

/// Content-addressed storage for object payloads.
///
/// Blobs are keyed by the content checksum supplied with the payload at
/// save time; the store never computes or verifies checksums itself.
/// The contract all backends honor:
///
/// - Saving is idempotent. If the checksum is already stored the save is
///   a no-op, and two saves racing on a new checksum both succeed with
///   the first writer's bytes kept.
/// - Reading a missing checksum fails with
///   [`NoSuchBlob`](crate::BlobError::NoSuchBlob).
/// - Removal is idempotent; removing a missing blob is a no-op.
/// - [`status`](BlobStore::status) never fails: an unreachable backend
///   is reported in the returned entries.
pub trait BlobStore: Send + Sync {
    /// Store `data` under `checksum` unless already present. `sorted`
    /// records whether the payload was canonically sorted before it was
    /// hashed; it is handed back unchanged on read.
    fn save_blob(
        &self,
        checksum: &Checksum,
        data: &mut dyn Read,
        sorted: bool,
    ) -> BlobResult<()>;

    /// Fetch a blob's content into a cache drawn from `cache_manager`'s
    /// budgets.
    fn get_blob(
        &self,
        checksum: &Checksum,
        cache_manager: &mut ByteCacheManager,
    ) -> BlobResult<ByteCache>;

    /// Delete the blob if present.
    fn remove_blob(&self, checksum: &Checksum) -> BlobResult<()>;

    /// Probe the backend.
    fn status(&self) -> Vec<DependencyStatus>;
}
