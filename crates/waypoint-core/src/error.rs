use thiserror::Error;

/// Validation errors raised by the core domain types.
///
/// These are terminal for the request that triggered them: a malformed URL
/// or alias is never retried, the caller has to fix its input.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid alias: {0}")]
    InvalidAlias(String),
}
