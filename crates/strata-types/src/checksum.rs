use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content checksum addressing a stored blob.
///
/// Checksums are 128-bit hashes computed by the type-validation layer before
/// objects reach this store; this type never hashes anything itself. Identical
/// content always carries the same checksum, which is what makes blob storage
/// deduplicatable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum([u8; 16]);

impl Checksum {
    /// Create a checksum from a pre-computed 16-byte hash.
    pub fn from_bytes(hash: [u8; 16]) -> Self {
        Self(hash)
    }

    /// The raw 16-byte hash.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Hex-encoded string representation (32 lowercase characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a 32-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 16 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len() * 2,
            });
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.short_hex())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 16]> for Checksum {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl From<Checksum> for [u8; 16] {
    fn from(sum: Checksum) -> Self {
        sum.0
    }
}

impl From<Checksum> for String {
    fn from(sum: Checksum) -> Self {
        sum.to_hex()
    }
}

impl TryFrom<String> for Checksum {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}
