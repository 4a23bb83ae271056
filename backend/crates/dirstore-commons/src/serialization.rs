//! Serialization trait for values stored in typed trees.
//!
//! `KSerializable` standardizes how values are turned into the raw bytes kept
//! by an ordered store. The default implementation uses bincode with the
//! standard configuration; types with a fixed binary layout override it.

use bincode::config::standard;
use serde::{Deserialize, Serialize};

use crate::errors::{CommonError, Result};

/// Trait implemented by values that can be stored in a typed tree.
///
/// ## Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use dirstore_commons::serialization::KSerializable;
///
/// #[derive(Serialize, Deserialize, Debug, PartialEq)]
/// struct Counter {
///     name: String,
///     value: u64,
/// }
///
/// impl KSerializable for Counter {}
///
/// let c = Counter { name: "entries".into(), value: 3 };
/// let bytes = c.encode().unwrap();
/// assert_eq!(Counter::decode(&bytes).unwrap(), c);
/// ```
pub trait KSerializable: Serialize + for<'de> Deserialize<'de> + Send + Sync {
    fn encode(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, standard())
            .map_err(|e| CommonError::serialization(format!("bincode encode failed: {}", e)))
    }

    fn decode(bytes: &[u8]) -> Result<Self>
    where
        Self: Sized,
    {
        bincode::serde::decode_from_slice(bytes, standard())
            .map(|(value, _)| value)
            .map_err(|e| CommonError::serialization(format!("bincode decode failed: {}", e)))
    }
}

impl KSerializable for String {}

impl KSerializable for crate::ids::EntryId {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.to_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes(bytes)
    }
}
