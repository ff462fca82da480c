use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum StorageError {
    /// An error that occurs when working with a storage backend
    #[error("Storage backend error: {0}")]
    StorageBackend(String),

    /// A stored key could not be decoded back into its original form
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        StorageError::StorageBackend(format!("{error}"))
    }
}
