use async_trait::async_trait;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use moka::Expiry;
use std::time::{Duration, Instant};
use tinylink_core::cache::{KvCache, Result};
use tinylink_core::CacheError;
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

/// How long a stored value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifetime {
    Forever,
    For(Duration),
    /// Keep whatever expiry the previous value had.
    Unchanged,
}

#[derive(Debug, Clone)]
struct Stored {
    data: String,
    lifetime: Lifetime,
}

struct PerEntryExpiry;

impl Expiry<String, Stored> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Stored,
        _created_at: Instant,
    ) -> Option<Duration> {
        match value.lifetime {
            Lifetime::For(ttl) => Some(ttl),
            Lifetime::Forever | Lifetime::Unchanged => None,
        }
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Stored,
        _updated_at: Instant,
        duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        match value.lifetime {
            Lifetime::For(ttl) => Some(ttl),
            Lifetime::Forever => None,
            Lifetime::Unchanged => duration_until_expiry,
        }
    }
}

/// An in-memory implementation of [`KvCache`] using Moka.
///
/// Suited to single-node deployments and tests. Each entry carries its own
/// time-to-live; atomic operations go through Moka's per-key entry API, so
/// `incr`, `get_del` and `set_nx_ex` behave like their Redis counterparts
/// within one process.
///
/// Entries can be evicted once `max_capacity` is reached. Size the cache so
/// that pending access counters are not pushed out between consolidations.
#[derive(Clone)]
pub struct MokaKvCache {
    cache: Cache<String, Stored>,
}

impl std::fmt::Debug for MokaKvCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaKvCache")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

/// Configuration for creating a [`MokaKvCache`].
#[derive(Debug, TypedBuilder)]
pub struct MokaKvCacheConfig {
    /// Maximum number of entries the cache can hold.
    #[builder(default = 100_000)]
    max_capacity: u64,
}

impl MokaKvCache {
    /// Creates a new Moka cache with default settings.
    pub fn new() -> Self {
        Self::from(MokaKvCacheConfig::builder().build())
    }
}

impl Default for MokaKvCache {
    fn default() -> Self {
        Self::new()
    }
}

impl From<MokaKvCacheConfig> for MokaKvCache {
    fn from(config: MokaKvCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(PerEntryExpiry)
            .build();
        Self { cache }
    }
}

fn parse_counter(key: &str, raw: &str) -> Result<i64> {
    raw.parse::<i64>().map_err(|_| {
        CacheError::InvalidData(format!("value at '{key}' is not an integer: '{raw}'"))
    })
}

#[async_trait]
impl KvCache for MokaKvCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self.cache.get(key).await.map(|stored| stored.data);
        trace!(key, hit = value.is_some(), "Moka get");
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.cache
            .insert(
                key.to_owned(),
                Stored {
                    data: value.to_owned(),
                    lifetime: Lifetime::For(ttl),
                },
            )
            .await;
        debug!(key, ttl_ms = ttl.as_millis() as u64, "Moka set");
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        trace!(key, "Moka del (if present)");
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let owned_key = key.to_owned();
        let result = self
            .cache
            .entry(owned_key)
            .and_try_compute_with(|existing| {
                let next = match existing {
                    None => Ok(Stored {
                        data: "1".to_string(),
                        lifetime: Lifetime::Forever,
                    }),
                    Some(entry) => parse_counter(key, &entry.value().data).and_then(|current| {
                        current
                            .checked_add(1)
                            .map(|next| Stored {
                                data: next.to_string(),
                                lifetime: Lifetime::Unchanged,
                            })
                            .ok_or_else(|| {
                                CacheError::Operation(format!("increment at '{key}' overflows"))
                            })
                    }),
                };
                std::future::ready(next.map(Op::Put))
            })
            .await?;

        match result {
            CompResult::Inserted(entry) | CompResult::ReplacedWith(entry) => {
                parse_counter(key, &entry.into_value().data)
            }
            _ => Err(CacheError::Operation(format!(
                "increment at '{key}' did not store a value"
            ))),
        }
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>> {
        // Goes through the entry lock so a concurrent `incr` cannot write
        // back a value read before the removal.
        let result = self
            .cache
            .entry(key.to_owned())
            .and_compute_with(|existing| {
                std::future::ready(match existing {
                    Some(_) => Op::Remove,
                    None => Op::Nop,
                })
            })
            .await;

        let value = match result {
            CompResult::Removed(entry) => Some(entry.into_value().data),
            _ => None,
        };
        trace!(key, hit = value.is_some(), "Moka get_del");
        Ok(value)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        debug!(prefix, count = keys.len(), "Scanned keys");
        Ok(keys)
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let entry = self
            .cache
            .entry(key.to_owned())
            .or_insert_with(async {
                Stored {
                    data: value.to_owned(),
                    lifetime: Lifetime::For(ttl),
                }
            })
            .await;
        Ok(entry.is_fresh())
    }
}
