use std::path::PathBuf;

/// Longest workspace description kept verbatim; longer input is
/// truncated, not rejected.
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// Resource limits and tuning knobs for a [`WorkspaceEngine`].
///
/// Every limit is enforced before the guarded work starts, so a request
/// over budget fails without partial writes or partial streaming.
///
/// [`WorkspaceEngine`]: crate::WorkspaceEngine
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Largest single object payload accepted by a save, in bytes.
    pub max_object_size: u64,
    /// Total payload bytes one bulk read may return across all requested
    /// objects.
    pub max_returned_data_size: u64,
    /// Payload bytes a bulk read may hold in memory before spilling the
    /// remainder to disk.
    pub max_returned_data_memory: usize,
    /// Largest serialized provenance accepted per saved object, in bytes.
    pub max_provenance_size: usize,
    /// Attempts for the optimistic per-key metadata update loop before
    /// giving up.
    pub metadata_update_attempts: u32,
    /// Attempts to claim an object name before treating the name index
    /// as corrupt. An insert that loses to a concurrent writer re-reads
    /// the winner; a second miss means records are flip-flopping faster
    /// than we can observe them.
    pub name_race_attempts: u32,
    /// Directory for read-path disk spill. `None` uses the system temp
    /// directory.
    pub temp_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_object_size: 1_000_000_000,
            max_returned_data_size: 1_000_000_000,
            max_returned_data_memory: 300_000_000,
            max_provenance_size: 1_000_000,
            metadata_update_attempts: 5,
            name_race_attempts: 2,
            temp_dir: None,
        }
    }
}

impl EngineConfig {
    /// Configuration with small memory budgets, sized for unit tests
    /// that want to exercise disk spill without allocating gigabytes.
    pub fn for_tests() -> Self {
        Self {
            max_returned_data_memory: 16 * 1024 * 1024,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
