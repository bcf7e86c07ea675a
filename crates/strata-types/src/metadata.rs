use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum serialized size of a metadata map, in bytes.
pub const MAX_METADATA_SIZE: usize = 16_000;
/// Maximum combined size of a single key + value pair, in bytes.
const MAX_KEY_VALUE_SIZE: usize = 900;

/// User-supplied key/value metadata attached to workspaces and object
/// versions.
///
/// Size-bounded: each key + value pair is limited to 900 bytes and the whole
/// map to 16000 bytes when serialized as JSON. Checked at construction and
/// again by the save pipeline before anything is written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserMetadata {
    entries: BTreeMap<String, String>,
}

impl UserMetadata {
    /// An empty metadata map.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from a map, enforcing the size limits.
    pub fn new(entries: BTreeMap<String, String>) -> Result<Self, TypeError> {
        let meta = Self { entries };
        meta.check_size()?;
        Ok(meta)
    }

    /// Re-check the size limits. Needed on top of construction-time checks
    /// because deserialization bypasses [`UserMetadata::new`].
    pub fn check_size(&self) -> Result<(), TypeError> {
        for (k, v) in &self.entries {
            if k.len() + v.len() > MAX_KEY_VALUE_SIZE {
                return Err(TypeError::OversizedMetadataEntry {
                    key: k.clone(),
                    max: MAX_KEY_VALUE_SIZE,
                });
            }
        }
        let size = self.serialized_size();
        if size > MAX_METADATA_SIZE {
            return Err(TypeError::MetadataTooLarge {
                size,
                max: MAX_METADATA_SIZE,
            });
        }
        Ok(())
    }

    /// Size of the map serialized as JSON, in bytes.
    pub fn serialized_size(&self) -> usize {
        // Serializing a string map cannot fail; treat a failure as oversized.
        serde_json::to_vec(&self.entries)
            .map(|b| b.len())
            .unwrap_or(usize::MAX)
    }

    /// Insert or replace a key, enforcing the size limits on the result.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), TypeError> {
        let key = key.into();
        let value = value.into();
        let prior = self.entries.insert(key.clone(), value);
        if let Err(e) = self.check_size() {
            // Roll back so a failed insert leaves the map unchanged.
            match prior {
                Some(v) => {
                    self.entries.insert(key, v);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Set a key without size validation.
    ///
    /// For record stores applying an update that was validated as a
    /// whole before being split into single-key writes. Everyone else
    /// should use [`UserMetadata::insert`].
    pub fn set_unchecked(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for UserMetadata {
    /// Collect without size checks; callers that accept untrusted input
    /// should use [`UserMetadata::new`] or call
    /// [`UserMetadata::check_size`] afterwards.
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
