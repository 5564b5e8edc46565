//! Content hashes for plan fingerprints.
//!
//! Uses BLAKE3 for all hashing operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A BLAKE3 hash (256 bits / 32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Compute BLAKE3 hash of data
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Compute the hash of a value's JSON encoding.
    ///
    /// Stable as long as the value serializes deterministically (ordered
    /// containers only).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized
    pub fn of_json<T: Serialize>(value: &T) -> Result<Self, HashError> {
        let bytes = serde_json::to_vec(value).map_err(|e| HashError::Encoding(e.to_string()))?;
        Ok(Self::compute(&bytes))
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Hash-related errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    /// Value could not be encoded
    #[error("Encoding failed: {0}")]
    Encoding(String),
}
