//! Filesystem [`BlobStore`] backend.
//!
//! Blobs live under a root directory, fanned out two levels deep by
//! checksum prefix (`ab/cd/abcd...`) to keep directory sizes sane. Writes
//! go to a temp file in the root and are moved into place with a
//! no-clobber rename, so concurrent saves of one checksum leave exactly
//! one complete file and readers never observe a partial blob.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use strata_types::{Checksum, DependencyStatus};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{BlobError, BlobResult};
use crate::handle::{ByteCache, ByteCacheManager};
use crate::traits::BlobStore;

/// [`BlobStore`] persisting blobs as files under a root directory.
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a blob directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> BlobResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "opened blob directory");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, checksum: &Checksum) -> PathBuf {
        let hex = checksum.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..4]).join(hex)
    }

    fn marker_path(&self, checksum: &Checksum) -> PathBuf {
        self.blob_path(checksum).with_extension("sorted")
    }
}

impl BlobStore for FsBlobStore {
    fn save_blob(
        &self,
        checksum: &Checksum,
        data: &mut dyn Read,
        sorted: bool,
    ) -> BlobResult<()> {
        let path = self.blob_path(checksum);
        if path.exists() {
            return Ok(());
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        // spool into the root so the final rename stays on one filesystem
        let mut spool = NamedTempFile::new_in(&self.root)?;
        io::copy(data, &mut spool)?;
        if sorted {
            fs::write(self.marker_path(checksum), b"")?;
        }
        match spool.persist_noclobber(&path) {
            Ok(_) => {
                debug!(checksum = %checksum, "blob written");
                Ok(())
            }
            // someone else just wrote the identical content
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(err) => Err(err.error.into()),
        }
    }

    fn get_blob(
        &self,
        checksum: &Checksum,
        cache_manager: &mut ByteCacheManager,
    ) -> BlobResult<ByteCache> {
        let file = match fs::File::open(self.blob_path(checksum)) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(BlobError::NoSuchBlob(*checksum));
            }
            Err(err) => return Err(err.into()),
        };
        let sorted = self.marker_path(checksum).exists();
        cache_manager.create_cache(file, sorted)
    }

    fn remove_blob(&self, checksum: &Checksum) -> BlobResult<()> {
        for path in [self.blob_path(checksum), self.marker_path(checksum)] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn status(&self) -> Vec<DependencyStatus> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => vec![DependencyStatus::up(
                "FsBlobStore",
                env!("CARGO_PKG_VERSION"),
            )],
            Ok(_) => vec![DependencyStatus::down(
                "FsBlobStore",
                format!("Blob path {} is not a directory", self.root.display()),
            )],
            Err(err) => vec![DependencyStatus::down(
                "FsBlobStore",
                format!("Couldn't access the blob directory: {err}"),
            )],
        }
    }
}
