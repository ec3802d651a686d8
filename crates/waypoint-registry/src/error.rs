use jiff::{SignedDuration, Timestamp};
use thiserror::Error;
use waypoint_core::{CoreError, RecordIdError};
use waypoint_store::StorageError;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid alias: {0}")]
    InvalidAlias(String),
    #[error("alias already taken: {0}")]
    AliasTaken(String),
    #[error("code allocation exhausted every retry tier")]
    AllocationExhausted,
    #[error("rate limited; next slot frees at {next_available_at}")]
    RateLimited {
        remaining_wait: SignedDuration,
        next_available_at: Timestamp,
    },
    #[error("id generation failed: {0}")]
    IdGeneration(#[from] RecordIdError),
    #[error("export failed: {0}")]
    Export(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<CoreError> for RegistryError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidUrl(message) => Self::InvalidUrl(message),
            CoreError::InvalidAlias(message) => Self::InvalidAlias(message),
        }
    }
}
