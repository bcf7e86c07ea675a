//! Memory-bounded handles for blob content.
//!
//! Bulk reads can return far more data than fits in memory. A
//! [`ByteCacheManager`] holds the budgets for one read call: content is
//! buffered in memory until the memory budget runs out, then spilled to
//! temp files until the disk budget runs out, at which point the read
//! fails rather than filling the disk.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{BlobError, BlobResult};

const CHUNK_SIZE: usize = 100_000;

/// Shared memory and disk budgets for the [`ByteCache`]s created during
/// one bulk read.
///
/// One manager is created per read call; budgets are never shared across
/// calls. Budget already consumed is not released when a cache drops,
/// matching the manager's per-call lifetime.
pub struct ByteCacheManager {
    in_memory: usize,
    max_in_memory: usize,
    on_disk: u64,
    max_on_disk: u64,
    temp_dir: Option<PathBuf>,
}

impl ByteCacheManager {
    pub fn new(max_in_memory: usize, max_on_disk: u64) -> Self {
        Self {
            in_memory: 0,
            max_in_memory,
            on_disk: 0,
            max_on_disk,
            temp_dir: None,
        }
    }

    /// A manager with budgets comfortable for unit tests.
    pub fn for_tests() -> Self {
        Self::new(16_000_000, 2_000_000_000)
    }

    /// Place spill files in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Drain `input` into a new cache, charging the budgets.
    ///
    /// Content that fills the remaining memory budget, even exactly, goes
    /// to disk. Exceeding the disk budget fails with
    /// [`BlobError::DiskLimitExceeded`] and deletes the partial spill
    /// file.
    pub fn create_cache(&mut self, mut input: impl Read, sorted: bool) -> BlobResult<ByteCache> {
        let budget = self.max_in_memory.saturating_sub(self.in_memory);
        let mut buffer = Vec::new();
        if !read_up_to(&mut input, &mut buffer, budget)? {
            self.in_memory += buffer.len();
            return Ok(ByteCache {
                size: buffer.len() as u64,
                sorted,
                backing: Backing::Memory(buffer),
            });
        }

        let mut file = match &self.temp_dir {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        file.write_all(&buffer)?;
        let mut size = buffer.len() as u64;
        drop(buffer);
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            if self.on_disk + size > self.max_on_disk {
                return Err(BlobError::DiskLimitExceeded);
            }
            let count = input.read(&mut chunk)?;
            if count == 0 {
                break;
            }
            file.write_all(&chunk[..count])?;
            size += count as u64;
        }
        file.flush()?;
        self.on_disk += size;
        debug!(size, "blob content spilled to disk");
        Ok(ByteCache {
            size,
            sorted,
            backing: Backing::File(file),
        })
    }
}

impl std::fmt::Debug for ByteCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteCacheManager")
            .field("in_memory", &self.in_memory)
            .field("max_in_memory", &self.max_in_memory)
            .field("on_disk", &self.on_disk)
            .field("max_on_disk", &self.max_on_disk)
            .finish()
    }
}

/// Read up to `budget` bytes into `buffer`. Returns true if the budget
/// was filled before the stream ended.
fn read_up_to(input: &mut impl Read, buffer: &mut Vec<u8>, budget: usize) -> io::Result<bool> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    while buffer.len() < budget {
        let want = chunk.len().min(budget - buffer.len());
        let count = input.read(&mut chunk[..want])?;
        if count == 0 {
            return Ok(false);
        }
        buffer.extend_from_slice(&chunk[..count]);
    }
    Ok(true)
}

enum Backing {
    Memory(Vec<u8>),
    File(NamedTempFile),
}

/// Blob content held in memory or spilled to a temp file.
///
/// File-backed content is deleted when the cache drops.
pub struct ByteCache {
    size: u64,
    sorted: bool,
    backing: Backing,
}

impl ByteCache {
    /// Wrap bytes already in hand, without budget accounting.
    pub fn from_bytes(bytes: Vec<u8>, sorted: bool) -> Self {
        Self {
            size: bytes.len() as u64,
            sorted,
            backing: Backing::Memory(bytes),
        }
    }

    /// Content length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the payload was canonically sorted before it was hashed,
    /// as recorded by the blob store at save time.
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn is_on_disk(&self) -> bool {
        matches!(self.backing, Backing::File(_))
    }

    /// The full content.
    pub fn bytes(&self) -> BlobResult<Vec<u8>> {
        match &self.backing {
            Backing::Memory(bytes) => Ok(bytes.clone()),
            Backing::File(file) => {
                let mut out = Vec::with_capacity(self.size as usize);
                file.reopen()?.read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }

    /// Stream the content without loading it whole.
    pub fn reader(&self) -> BlobResult<Box<dyn Read + Send + '_>> {
        match &self.backing {
            Backing::Memory(bytes) => Ok(Box::new(bytes.as_slice())),
            Backing::File(file) => Ok(Box::new(file.reopen()?)),
        }
    }
}

impl std::fmt::Debug for ByteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backing = match self.backing {
            Backing::Memory(_) => "memory",
            Backing::File(_) => "file",
        };
        f.debug_struct("ByteCache")
            .field("size", &self.size)
            .field("sorted", &self.sorted)
            .field("backing", &backing)
            .finish()
    }
}
