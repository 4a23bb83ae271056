//! EntryId - server-assigned identifier of a directory entry
//!
//! Entry IDs are issued once per entry by the root container's counter and are
//! never reused within the lifetime of a tree. They serve as the primary-key
//! surrogate in id2entry and as the members of every index value.

use crate::errors::{CommonError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a directory entry.
///
/// Serialized as a fixed-width 8-byte big-endian value so that byte order
/// matches numeric order when used as a tree key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(u64);

impl EntryId {
    /// Encoded width in bytes
    pub const SIZE: usize = 8;

    /// Create a new EntryId from its raw value
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The identifier issued right after this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Convert to bytes (big-endian for consistent ordering in the store)
    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Parse from bytes (big-endian)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(CommonError::serialization(format!(
                "Invalid entry ID length: expected {}, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }
        let mut array = [0u8; 8];
        array.copy_from_slice(bytes);
        Ok(Self::new(u64::from_be_bytes(array)))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntryId {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<EntryId> for u64 {
    fn from(id: EntryId) -> Self {
        id.0
    }
}
