//! Key-value cache backends for the shortener.

pub mod moka;
pub mod redis;

pub use self::moka::{MokaKvCache, MokaKvCacheConfig};
pub use self::redis::RedisKvCache;
pub use tinylink_core::cache::{KvCache, Result};
pub use tinylink_core::CacheError;
