//! Shared error types for dirstore.
//!
//! ## Example Usage
//!
//! ```rust
//! use dirstore_commons::errors::{CommonError, Result};
//!
//! fn validate_attribute(name: &str) -> Result<()> {
//!     if name.is_empty() {
//!         return Err(CommonError::invalid_input("attribute name cannot be empty"));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;

/// Common error type for dirstore value types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Invalid input provided to a function
    InvalidInput(String),

    /// A distinguished name could not be parsed
    InvalidDn(String),

    /// Bytes could not be decoded into the expected value
    Serialization(String),

    /// Internal error (unexpected state)
    Internal(String),
}

impl CommonError {
    /// Creates an InvalidInput error with a message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates an InvalidDn error with a message.
    pub fn invalid_dn(msg: impl Into<String>) -> Self {
        Self::InvalidDn(msg.into())
    }

    /// Creates a Serialization error with a message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates an Internal error with a message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommonError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            CommonError::InvalidDn(msg) => write!(f, "Invalid DN: {}", msg),
            CommonError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            CommonError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for CommonError {}

/// Result type alias using CommonError.
pub type Result<T> = std::result::Result<T, CommonError>;
