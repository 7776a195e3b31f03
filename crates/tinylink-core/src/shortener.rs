use crate::error::ShortenerError;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

type Result<T> = std::result::Result<T, ShortenerError>;

/// A freshly minted short link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortLink {
    /// The generated short code.
    pub code: ShortCode,
    /// The fully qualified short URL (`{base_url}/{code}`).
    pub short_url: String,
}

/// The request-facing operations of the shortener.
#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Mints a new short code for `original_url` and stores the mapping.
    async fn mint(&self, original_url: &str) -> Result<ShortLink>;

    /// Resolves a short code to its original URL, recording the access.
    /// Returns `None` if the code does not exist.
    async fn resolve(&self, code: &ShortCode) -> Result<Option<String>>;

    /// Retires a short code from both the cache and durable storage.
    /// Returns `true` if a stored mapping was removed.
    async fn retire(&self, code: &ShortCode) -> Result<bool>;
}
