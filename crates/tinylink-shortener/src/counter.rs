use std::sync::Arc;
use tinylink_core::cache::{KvCache, Result};
use tinylink_core::ShortCode;
use tracing::trace;

/// Prefix shared by every access counter key.
pub const STATS_PREFIX: &str = "stats:";

/// Pending per-code access counts kept in the cache tier.
///
/// Each successful resolve bumps `stats:{code}`; the consolidation job
/// later drains the counters into durable storage.
#[derive(Debug)]
pub struct AccessCounter<C> {
    cache: Arc<C>,
}

impl<C> Clone for AccessCounter<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<C: KvCache> AccessCounter<C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self { cache }
    }

    /// Records one access to `code` and returns the pending count.
    pub async fn record(&self, code: &ShortCode) -> Result<i64> {
        let pending = self.cache.incr(&counter_key(code)).await?;
        trace!(code = %code, pending, "Recorded access");
        Ok(pending)
    }

    /// Returns the accesses recorded for `code` that are not yet durable.
    pub async fn pending(&self, code: &ShortCode) -> Result<u64> {
        let raw = self.cache.get(&counter_key(code)).await?;
        Ok(raw.and_then(|v| v.parse().ok()).unwrap_or(0))
    }
}

/// Cache key holding the pending access count of `code`.
pub fn counter_key(code: &ShortCode) -> String {
    format!("{STATS_PREFIX}{code}")
}

/// The code a counter key belongs to, if `key` is a counter key at all.
pub fn code_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(STATS_PREFIX).filter(|code| !code.is_empty())
}
