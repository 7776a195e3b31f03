use crate::error::StorageError;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A stored URL record in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// The original URL that was shortened.
    pub original_url: String,
    /// Accesses already folded into durable storage.
    pub access_count: u64,
}

/// A read-only view of a repository.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Retrieves the URL record for a given short code.
    /// Returns `None` if the code does not exist.
    async fn get(&self, code: &ShortCode) -> Result<Option<UrlRecord>>;
}

/// The durable, authoritative store of short code mappings.
#[async_trait]
pub trait Repository: ReadRepository {
    /// Inserts a new mapping with an access count of zero.
    ///
    /// Returns `Err(StorageError::Conflict)` if the code is already taken.
    /// A failed insert leaves no partial row behind.
    async fn insert(&self, code: &ShortCode, original_url: &str) -> Result<()>;

    /// Deletes the mapping for a given short code.
    /// Returns `true` if the record existed and was removed.
    async fn delete(&self, code: &ShortCode) -> Result<bool>;

    /// Adds each delta to the matching record's access count.
    ///
    /// All deltas are applied in a single transaction: either every
    /// increment is committed or none is. Codes without a record are
    /// ignored. Returns the number of records updated.
    async fn apply_access_counts(&self, deltas: &[(ShortCode, u64)]) -> Result<u64>;
}
