use crate::error::CacheError;
use async_trait::async_trait;
use std::time::Duration;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// A key-value cache tier with expiry and atomic primitives.
///
/// Every method is a single atomic operation on one key (or, for
/// [`scan_prefix`](KvCache::scan_prefix), a read-only enumeration).
/// Nothing here is composed transactionally with the durable store.
#[async_trait]
pub trait KvCache: Send + Sync + 'static {
    /// Returns the value stored at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` at `key`, replacing any previous value, expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Removes `key`. It is not an error if the key does not exist.
    async fn del(&self, key: &str) -> Result<()>;

    /// Increments the integer at `key` by one and returns the new value.
    ///
    /// A missing key is created at 1 without expiry.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Returns the value at `key` and removes it in one indivisible step.
    async fn get_del(&self, key: &str) -> Result<Option<String>>;

    /// Lists the keys currently starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Stores `value` at `key` only if the key is absent, expiring after `ttl`.
    ///
    /// Returns `true` when this call created the key.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;
}
