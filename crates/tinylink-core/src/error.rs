use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out: {0}")]
    Timeout(String),
    #[error("cache value is invalid: {0}")]
    InvalidData(String),
    #[error("cache operation failed: {0}")]
    Operation(String),
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short code already exists: {0}")]
    Conflict(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage migration failed: {0}")]
    Migration(String),
}

/// Errors surfaced to callers of the [`Shortener`](crate::Shortener).
///
/// A missing short code is not an error: `resolve` reports it as `None`.
#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("could not mint a unique short code after {attempts} attempts")]
    TokenSpaceExhausted { attempts: u32 },
    #[error("failed to delete the shortened URL: {0}")]
    DeletionFailed(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

impl ShortenerError {
    /// Whether the caller may answer with a client-error response instead
    /// of a generic internal failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::DeletionFailed(_) | Self::InvalidUrl(_) | Self::InvalidShortCode(_)
        )
    }
}
