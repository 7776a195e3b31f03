use std::time::Duration;
use typed_builder::TypedBuilder;

/// Default lifetime of a cached `code -> url` entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(86_400);
/// Default number of candidate codes tried before minting gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_CONSOLIDATION_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_LEASE_NAME: &str = "lock:consolidator";
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(10);

/// Configuration for the [`ShortenerService`](crate::ShortenerService).
#[derive(Debug, Clone, TypedBuilder)]
pub struct ShortenerConfig {
    /// Public prefix of every short URL (e.g., "https://tiny.link").
    #[builder(setter(into))]
    pub base_url: String,
    #[builder(default = DEFAULT_CACHE_TTL)]
    pub cache_ttl: Duration,
    /// Upper bound on mint attempts, counting the first one.
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
}

/// Configuration for the [`ConsolidationJob`](crate::ConsolidationJob).
#[derive(Debug, Clone, TypedBuilder)]
pub struct ConsolidationConfig {
    /// Time between two ticks.
    #[builder(default = DEFAULT_CONSOLIDATION_INTERVAL)]
    pub interval: Duration,
    /// Cache key of the lease shared by every instance.
    #[builder(default = DEFAULT_LEASE_NAME.to_string(), setter(into))]
    pub lease_name: String,
    /// How long a lease is held once acquired. Never renewed.
    #[builder(default = DEFAULT_LEASE_TTL)]
    pub lease_ttl: Duration,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
