use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashSet;
use std::time::Duration;
use tinylink_core::cache::{KvCache, Result};
use tinylink_core::CacheError;
use tracing::{debug, trace, warn};

/// Keys requested per SCAN round trip.
const SCAN_BATCH: usize = 500;

/// A Redis-based implementation of [`KvCache`].
///
/// Every operation maps to a single Redis command, so the atomicity of
/// `INCR`, `GETDEL` and `SET .. NX PX` is the server's. Keys may be placed
/// under a namespace so that several deployments can share one server; the
/// namespace is invisible to callers, including in
/// [`scan_prefix`](KvCache::scan_prefix) results.
#[derive(Debug, Clone)]
pub struct RedisKvCache {
    conn: redis::aio::MultiplexedConnection,
    namespace: String,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> CacheError {
    let message = format!("{operation}: {err}");
    if err.is_timeout() {
        CacheError::Timeout(message)
    } else if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
        CacheError::Unavailable(message)
    } else {
        CacheError::Operation(message)
    }
}

/// Escapes glob metacharacters so a prefix matches literally in `SCAN MATCH`.
fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl RedisKvCache {
    /// Creates a new Redis cache without a key namespace.
    ///
    /// # Arguments
    ///
    /// * `conn` - A multiplexed Redis connection
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self {
            conn,
            namespace: String::new(),
        }
    }

    /// Creates a new Redis cache whose keys all live under `namespace`.
    ///
    /// # Arguments
    ///
    /// * `conn` - A multiplexed Redis connection
    /// * `namespace` - Prefix for every key (e.g., "tinylink:")
    pub fn with_namespace(
        conn: redis::aio::MultiplexedConnection,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            namespace: namespace.into(),
        }
    }

    /// Opens a multiplexed connection to `redis_url`.
    pub async fn connect(redis_url: &str, namespace: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| map_redis_error("invalid Redis URL", e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| map_redis_error("failed to connect to Redis", e))?;
        Ok(Self::with_namespace(conn, namespace))
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }
}

#[async_trait]
impl KvCache for RedisKvCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        trace!(key, "GET");

        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(self.key(key))
            .await
            .map_err(|e| {
                warn!(key, error = %e, "Redis error on get");
                map_redis_error("failed to fetch value from Redis", e)
            })
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        trace!(key, ttl_ms = ttl_millis(ttl), "PSETEX");

        let mut conn = self.conn.clone();
        conn.pset_ex::<_, _, ()>(self.key(key), value, ttl_millis(ttl))
            .await
            .map_err(|e| {
                warn!(key, error = %e, "Failed to write value to Redis");
                map_redis_error("failed to write value to Redis", e)
            })
    }

    async fn del(&self, key: &str) -> Result<()> {
        trace!(key, "DEL");

        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.key(key)).await.map_err(|e| {
            warn!(key, error = %e, "Failed to remove key from Redis");
            map_redis_error("failed to delete value from Redis", e)
        })
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        trace!(key, "INCR");

        let mut conn = self.conn.clone();
        conn.incr::<_, _, i64>(self.key(key), 1_i64)
            .await
            .map_err(|e| {
                warn!(key, error = %e, "Failed to increment counter in Redis");
                map_redis_error("failed to increment value in Redis", e)
            })
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>> {
        trace!(key, "GETDEL");

        let mut conn = self.conn.clone();
        conn.get_del::<_, Option<String>>(self.key(key))
            .await
            .map_err(|e| {
                warn!(key, error = %e, "Failed to drain key from Redis");
                map_redis_error("failed to get-and-delete value in Redis", e)
            })
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}*", escape_glob(&self.key(prefix)));
        trace!(pattern = %pattern, "SCAN");

        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        // SCAN may return a key more than once while the keyspace is rehashing.
        let mut seen = HashSet::new();
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| map_redis_error("failed to scan keys in Redis", e))?;

            for key in batch {
                let Some(stripped) = key.strip_prefix(self.namespace.as_str()) else {
                    continue;
                };
                if seen.insert(stripped.to_string()) {
                    keys.push(stripped.to_string());
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(prefix, count = keys.len(), "Scanned keys");
        Ok(keys)
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        trace!(key, ttl_ms = ttl_millis(ttl), "SET NX PX");

        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("failed to conditionally set value in Redis", e))?;

        Ok(reply.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_glob_escapes_metacharacters() {
        assert_eq!(escape_glob("stats:"), "stats:");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    #[test]
    fn ttl_millis_never_rounds_to_zero() {
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(10)), 10_000);
    }
}
