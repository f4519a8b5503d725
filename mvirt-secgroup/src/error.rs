//! Error kinds surfaced by reconciliation and cloning.

use thiserror::Error;

use crate::store::StorageError;

#[derive(Debug, Error)]
pub enum SecGroupError {
    /// Empty or malformed input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("duplicate name: {0}")]
    DuplicateName(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("persistence failure: {0}")]
    Persistence(StorageError),

    /// Two records claim the same provider identity. Aborts the run.
    #[error("identity conflict on external id {external_id}: {detail}")]
    IdentityConflict { external_id: String, detail: String },

    /// The provider listing failed.
    #[error("provider error: {0}")]
    Provider(String),
}

impl From<StorageError> for SecGroupError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::SecurityGroupNameExists(name) => SecGroupError::DuplicateName(name),
            StorageError::SecurityGroupNotFound(id) => SecGroupError::NotFound(id),
            other => SecGroupError::Persistence(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SecGroupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_mapping() {
        let e: SecGroupError = StorageError::SecurityGroupNameExists("web".to_string()).into();
        assert!(matches!(e, SecGroupError::DuplicateName(ref n) if n == "web"));

        let e: SecGroupError = StorageError::SecurityGroupNotFound("abc".to_string()).into();
        assert!(matches!(e, SecGroupError::NotFound(_)));

        let e: SecGroupError = StorageError::LockPoisoned.into();
        assert!(matches!(e, SecGroupError::Persistence(StorageError::LockPoisoned)));
    }
}
