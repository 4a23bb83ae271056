//! Directory-level errors returned by entry containers and the import
//! entry points.

use dirstore_commons::CommonError;
use dirstore_store::StorageError;
use std::fmt;

/// LDAP-style result code carried by a [`DirectoryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    EntryAlreadyExists,
    NoSuchObject,
    NotAllowedOnNonLeaf,
    UnwillingToPerform,
    OperationsError,
    Other,
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultCode::EntryAlreadyExists => "entryAlreadyExists",
            ResultCode::NoSuchObject => "noSuchObject",
            ResultCode::NotAllowedOnNonLeaf => "notAllowedOnNonLeaf",
            ResultCode::UnwillingToPerform => "unwillingToPerform",
            ResultCode::OperationsError => "operationsError",
            ResultCode::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{result_code}: {message}")]
pub struct DirectoryError {
    pub result_code: ResultCode,
    pub message: String,
}

impl DirectoryError {
    pub fn new(result_code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            result_code,
            message: message.into(),
        }
    }

    pub fn entry_already_exists(message: impl Into<String>) -> Self {
        Self::new(ResultCode::EntryAlreadyExists, message)
    }

    pub fn no_such_object(message: impl Into<String>) -> Self {
        Self::new(ResultCode::NoSuchObject, message)
    }

    pub fn not_allowed_on_non_leaf(message: impl Into<String>) -> Self {
        Self::new(ResultCode::NotAllowedOnNonLeaf, message)
    }

    pub fn unwilling_to_perform(message: impl Into<String>) -> Self {
        Self::new(ResultCode::UnwillingToPerform, message)
    }

    pub fn operations_error(message: impl Into<String>) -> Self {
        Self::new(ResultCode::OperationsError, message)
    }
}

impl From<StorageError> for DirectoryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(reason) => Self::unwilling_to_perform(format!(
                "The backend storage is locked down: {}",
                reason
            )),
            other => Self::operations_error(other.to_string()),
        }
    }
}

impl From<CommonError> for DirectoryError {
    fn from(err: CommonError) -> Self {
        Self::new(ResultCode::Other, err.to_string())
    }
}

impl From<std::io::Error> for DirectoryError {
    fn from(err: std::io::Error) -> Self {
        Self::operations_error(format!("I/O error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, DirectoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_mapping() {
        let err: DirectoryError = StorageError::Io("disk".into()).into();
        assert_eq!(err.result_code, ResultCode::OperationsError);

        let err: DirectoryError = StorageError::Unavailable("full".into()).into();
        assert_eq!(err.result_code, ResultCode::UnwillingToPerform);
    }

    #[test]
    fn test_display() {
        let err = DirectoryError::no_such_object("cn=x");
        assert_eq!(err.to_string(), "noSuchObject: cn=x");
    }
}
