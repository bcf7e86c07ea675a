//! In-memory [`BlobStore`] backend.

use std::collections::HashMap;
use std::io::Read;
use std::sync::RwLock;

use strata_types::{Checksum, DependencyStatus};

use crate::error::{BlobError, BlobResult};
use crate::handle::{ByteCache, ByteCacheManager};
use crate::traits::BlobStore;

struct StoredBlob {
    bytes: Vec<u8>,
    sorted: bool,
}

/// [`BlobStore`] holding all blobs in process memory. Used in tests and
/// for embedding.
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<Checksum, StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    pub fn contains(&self, checksum: &Checksum) -> bool {
        self.blobs
            .read()
            .expect("lock poisoned")
            .contains_key(checksum)
    }

    /// Total stored payload bytes.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|blob| blob.bytes.len() as u64)
            .sum()
    }

    pub fn clear(&self) {
        self.blobs.write().expect("lock poisoned").clear();
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlobStore")
            .field("blob_count", &self.blob_count())
            .finish()
    }
}

impl BlobStore for MemoryBlobStore {
    fn save_blob(
        &self,
        checksum: &Checksum,
        data: &mut dyn Read,
        sorted: bool,
    ) -> BlobResult<()> {
        if self.contains(checksum) {
            return Ok(());
        }
        // read outside the lock; a racing writer of the same checksum
        // carries identical content, so either copy may win
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes)?;
        self.blobs
            .write()
            .expect("lock poisoned")
            .entry(*checksum)
            .or_insert(StoredBlob { bytes, sorted });
        Ok(())
    }

    fn get_blob(
        &self,
        checksum: &Checksum,
        cache_manager: &mut ByteCacheManager,
    ) -> BlobResult<ByteCache> {
        let blobs = self.blobs.read().expect("lock poisoned");
        let blob = blobs
            .get(checksum)
            .ok_or(BlobError::NoSuchBlob(*checksum))?;
        cache_manager.create_cache(blob.bytes.as_slice(), blob.sorted)
    }

    fn remove_blob(&self, checksum: &Checksum) -> BlobResult<()> {
        self.blobs.write().expect("lock poisoned").remove(checksum);
        Ok(())
    }

    fn status(&self) -> Vec<DependencyStatus> {
        vec![DependencyStatus::up(
            "MemoryBlobStore",
            env!("CARGO_PKG_VERSION"),
        )]
    }
}
