use chrono::{DateTime, Utc};
use strata_blobs::BlobStore;
use strata_store::{truncate_to_millis, RecordStore};
use strata_types::DependencyStatus;
use tracing::debug;

use crate::config::EngineConfig;

/// The versioned object store behind one facade: workspaces, objects,
/// versions, permissions and payload blobs.
///
/// The engine owns a [`RecordStore`] for document-shaped records and a
/// [`BlobStore`] for payload bytes, and composes their atomic
/// single-record operations into the multi-step pipelines callers see.
/// No step holds a lock across records; every sequence is written so a
/// crash between steps leaves counters ahead of records, which readers
/// treat as "not yet visible" rather than corruption.
///
/// Method groups live in sibling modules: identifier resolution,
/// permissions, workspace administration, the save pipeline,
/// copy/revert/clone, reads, listing, and metadata updates.
pub struct WorkspaceEngine<S, B> {
    pub(crate) store: S,
    pub(crate) blobs: B,
    pub(crate) config: EngineConfig,
}

impl<S: RecordStore, B: BlobStore> WorkspaceEngine<S, B> {
    /// An engine with default resource limits.
    pub fn new(store: S, blobs: B) -> Self {
        Self::with_config(store, blobs, EngineConfig::default())
    }

    pub fn with_config(store: S, blobs: B, config: EngineConfig) -> Self {
        debug!(
            max_object_size = config.max_object_size,
            max_returned_data_size = config.max_returned_data_size,
            "workspace engine initialized"
        );
        Self {
            store,
            blobs,
            config,
        }
    }

    /// The record store backing this engine.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The blob store backing this engine.
    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Health of every backend the engine depends on, record store
    /// first. Never fails; unreachable backends report as down.
    pub fn status(&self) -> Vec<DependencyStatus> {
        let mut out = vec![self.store.status()];
        out.extend(self.blobs.status());
        out
    }

    /// Current time at the precision the store keeps.
    pub(crate) fn now() -> DateTime<Utc> {
        truncate_to_millis(Utc::now())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
