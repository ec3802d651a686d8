use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("code or alias already exists: {0}")]
    Conflict(String),
    #[error("store capacity exceeded: {0}")]
    CapacityExceeded(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

impl StorageError {
    /// Whether a sweep-then-retry is worth attempting for this failure.
    pub fn is_capacity(&self) -> bool {
        matches!(self, StorageError::CapacityExceeded(_))
    }
}
