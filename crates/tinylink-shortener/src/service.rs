use crate::config::ShortenerConfig;
use crate::counter::AccessCounter;
use crate::generator::Generator;
use async_trait::async_trait;
use std::sync::Arc;
use tinylink_core::validation::validate_url;
use tinylink_core::{
    KvCache, Repository, ShortCode, ShortLink, Shortener, ShortenerError, StorageError,
};
use tracing::{debug, trace, warn};

/// A concrete implementation of the `Shortener` trait.
///
/// This service combines a durable `Repository` with a `KvCache` in front
/// of it:
/// - Minting inserts a fresh code and warms the cache, retrying on collisions
/// - Resolving reads through the cache and counts every successful access
/// - Retiring removes the code from the cache before the store
///
/// The repository is the source of truth. Cache writes that fail after the
/// store has answered are logged and otherwise ignored.
#[derive(Debug)]
pub struct ShortenerService<R, C, G> {
    repository: Arc<R>,
    cache: Arc<C>,
    generator: Arc<G>,
    counter: AccessCounter<C>,
    config: ShortenerConfig,
}

impl<R, C, G> Clone for ShortenerService<R, C, G> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            cache: Arc::clone(&self.cache),
            generator: Arc::clone(&self.generator),
            counter: self.counter.clone(),
            config: self.config.clone(),
        }
    }
}

impl<R: Repository, C: KvCache, G: Generator> ShortenerService<R, C, G> {
    /// Creates a new `ShortenerService`.
    ///
    /// The repository and cache are shared so the same instances can back
    /// a [`ConsolidationJob`](crate::ConsolidationJob).
    pub fn new(repository: Arc<R>, cache: Arc<C>, generator: G, config: ShortenerConfig) -> Self {
        Self {
            counter: AccessCounter::new(Arc::clone(&cache)),
            repository,
            cache,
            generator: Arc::new(generator),
            config,
        }
    }

    pub fn config(&self) -> &ShortenerConfig {
        &self.config
    }

    async fn fill_cache(&self, code: &ShortCode, original_url: &str) {
        match self
            .cache
            .set_ex(code.as_str(), original_url, self.config.cache_ttl)
            .await
        {
            Ok(()) => debug!(code = %code, "Cached URL"),
            Err(e) => warn!(code = %code, error = %e, "Failed to cache URL"),
        }
    }

    async fn record_access(&self, code: &ShortCode) {
        if let Err(e) = self.counter.record(code).await {
            warn!(code = %code, error = %e, "Failed to record access");
        }
    }
}

#[async_trait]
impl<R: Repository, C: KvCache, G: Generator> Shortener for ShortenerService<R, C, G> {
    async fn mint(&self, original_url: &str) -> Result<ShortLink, ShortenerError> {
        validate_url(original_url)?;

        let max_attempts = self.config.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let code = self.generator.generate();

            match self.repository.insert(&code, original_url).await {
                Ok(()) => {
                    self.fill_cache(&code, original_url).await;
                    debug!(code = %code, attempt, "Minted short code");
                    return Ok(ShortLink {
                        short_url: code.to_url(&self.config.base_url),
                        code,
                    });
                }
                Err(StorageError::Conflict(_)) => {
                    debug!(code = %code, attempt, "Short code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(attempts = max_attempts, "Exhausted attempts to mint a unique short code");
        Err(ShortenerError::TokenSpaceExhausted {
            attempts: max_attempts,
        })
    }

    async fn resolve(&self, code: &ShortCode) -> Result<Option<String>, ShortenerError> {
        if let Some(url) = self.cache.get(code.as_str()).await? {
            trace!(code = %code, "Cache hit");
            self.record_access(code).await;
            return Ok(Some(url));
        }

        trace!(code = %code, "Cache miss");
        let Some(record) = self.repository.get(code).await? else {
            debug!(code = %code, "Short code not found");
            return Ok(None);
        };

        self.fill_cache(code, &record.original_url).await;
        self.record_access(code).await;
        Ok(Some(record.original_url))
    }

    async fn retire(&self, code: &ShortCode) -> Result<bool, ShortenerError> {
        self.cache.del(code.as_str()).await?;

        let removed = self.repository.delete(code).await.map_err(|e| {
            warn!(code = %code, error = %e, "Failed to delete short code");
            ShortenerError::DeletionFailed(e.to_string())
        })?;

        debug!(code = %code, removed, "Retired short code");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::RandomGenerator;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tinylink_cache::MokaKvCache;
    use tinylink_core::repository::Result as RepoResult;
    use tinylink_core::{ReadRepository, UrlRecord};
    use tinylink_storage::InMemoryRepository;

    const BASE: &str = "http://short";

    /// Counts calls while delegating to an in-memory repository.
    #[derive(Default)]
    struct CountingRepository {
        inner: InMemoryRepository,
        gets: AtomicUsize,
        inserts: AtomicUsize,
    }

    impl CountingRepository {
        fn gets(&self) -> usize {
            self.gets.load(Ordering::SeqCst)
        }

        fn inserts(&self) -> usize {
            self.inserts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReadRepository for CountingRepository {
        async fn get(&self, code: &ShortCode) -> RepoResult<Option<UrlRecord>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(code).await
        }
    }

    #[async_trait]
    impl Repository for CountingRepository {
        async fn insert(&self, code: &ShortCode, original_url: &str) -> RepoResult<()> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            self.inner.insert(code, original_url).await
        }

        async fn delete(&self, code: &ShortCode) -> RepoResult<bool> {
            self.inner.delete(code).await
        }

        async fn apply_access_counts(
            &self,
            deltas: &[(ShortCode, u64)],
        ) -> RepoResult<u64> {
            self.inner.apply_access_counts(deltas).await
        }
    }

    /// A store that is reachable for reads but refuses every write.
    struct ReadOnlyRepository;

    #[async_trait]
    impl ReadRepository for ReadOnlyRepository {
        async fn get(&self, _code: &ShortCode) -> RepoResult<Option<UrlRecord>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl Repository for ReadOnlyRepository {
        async fn insert(&self, _code: &ShortCode, _url: &str) -> RepoResult<()> {
            Err(StorageError::Unavailable("read only".to_string()))
        }

        async fn delete(&self, _code: &ShortCode) -> RepoResult<bool> {
            Err(StorageError::Unavailable("read only".to_string()))
        }

        async fn apply_access_counts(
            &self,
            _deltas: &[(ShortCode, u64)],
        ) -> RepoResult<u64> {
            Err(StorageError::Unavailable("read only".to_string()))
        }
    }

    /// Hands out predetermined codes, repeating the last one forever.
    struct ScriptedGenerator {
        codes: Mutex<VecDeque<&'static str>>,
        last: &'static str,
    }

    impl ScriptedGenerator {
        fn new(codes: &[&'static str]) -> Self {
            Self {
                codes: Mutex::new(codes.iter().copied().collect()),
                last: codes[codes.len() - 1],
            }
        }
    }

    impl Generator for ScriptedGenerator {
        fn generate(&self) -> ShortCode {
            let next = self.codes.lock().unwrap().pop_front().unwrap_or(self.last);
            ShortCode::new_unchecked(next)
        }
    }

    fn config() -> ShortenerConfig {
        ShortenerConfig::builder().base_url(BASE).build()
    }

    fn service_with<G: Generator>(
        generator: G,
    ) -> (
        ShortenerService<CountingRepository, MokaKvCache, G>,
        Arc<CountingRepository>,
        Arc<MokaKvCache>,
    ) {
        let repo = Arc::new(CountingRepository::default());
        let cache = Arc::new(MokaKvCache::new());
        let service =
            ShortenerService::new(Arc::clone(&repo), Arc::clone(&cache), generator, config());
        (service, repo, cache)
    }

    fn code(value: &str) -> ShortCode {
        ShortCode::new_unchecked(value)
    }

    #[tokio::test]
    async fn mint_returns_short_url_and_stores_mapping() {
        let (service, repo, cache) = service_with(RandomGenerator::new());

        let link = service.mint("https://example.com").await.unwrap();

        assert_eq!(link.code.as_str().len(), 6);
        assert_eq!(link.short_url, format!("{BASE}/{}", link.code));
        let record = repo.inner.get(&link.code).await.unwrap().unwrap();
        assert_eq!(record.original_url, "https://example.com");
        assert_eq!(record.access_count, 0);
        assert_eq!(
            cache.get(link.code.as_str()).await.unwrap().as_deref(),
            Some("https://example.com")
        );
    }

    #[tokio::test]
    async fn mint_trims_trailing_slash_of_base_url() {
        let repo = Arc::new(InMemoryRepository::new());
        let cache = Arc::new(MokaKvCache::new());
        let config = ShortenerConfig::builder().base_url("http://short/").build();
        let generator = ScriptedGenerator::new(&["abc123"]);
        let service = ShortenerService::new(repo, cache, generator, config);

        let link = service.mint("https://example.com").await.unwrap();
        assert_eq!(link.short_url, "http://short/abc123");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mints_get_distinct_codes() {
        let (service, repo, _cache) = service_with(RandomGenerator::new());
        let mut handles = vec![];

        for task in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                let mut codes = vec![];
                for i in 0..50 {
                    let url = format!("https://example.com/{task}/{i}");
                    codes.push(service.mint(&url).await.unwrap().code);
                }
                codes
            }));
        }

        let mut codes = std::collections::HashSet::new();
        for handle in handles {
            for code in handle.await.unwrap() {
                assert!(codes.insert(code));
            }
        }
        assert_eq!(codes.len(), 400);
        assert_eq!(repo.inner.len(), 400);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mints_of_one_candidate_admit_one_winner() {
        let (service, repo, _cache) = service_with(ScriptedGenerator::new(&["same00"]));
        let mut handles = vec![];

        for i in 0..16 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.mint(&format!("https://example{i}.com")).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(link) => {
                    assert_eq!(link.code.as_str(), "same00");
                    winners += 1;
                }
                Err(err) => {
                    assert!(matches!(err, ShortenerError::TokenSpaceExhausted { attempts: 5 }))
                }
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(repo.inner.len(), 1);
        assert_eq!(repo.inserts(), 1 + 15 * 5);
    }

    #[tokio::test]
    async fn mint_retries_after_collision() {
        let generator = ScriptedGenerator::new(&["taken0", "taken0", "fresh1"]);
        let (service, repo, _cache) = service_with(generator);
        repo.inner.insert(&code("taken0"), "https://first.example").await.unwrap();

        let link = service.mint("https://second.example").await.unwrap();

        assert_eq!(link.code.as_str(), "fresh1");
        assert_eq!(repo.inserts(), 3);
        // The colliding row is untouched.
        let taken = repo.inner.get(&code("taken0")).await.unwrap().unwrap();
        assert_eq!(taken.original_url, "https://first.example");
    }

    #[tokio::test]
    async fn mint_gives_up_after_exactly_five_attempts() {
        let (service, repo, _cache) = service_with(ScriptedGenerator::new(&["taken0"]));
        repo.inner.insert(&code("taken0"), "https://first.example").await.unwrap();

        let err = service.mint("https://second.example").await.unwrap_err();

        assert!(matches!(err, ShortenerError::TokenSpaceExhausted { attempts: 5 }));
        assert_eq!(repo.inserts(), 5);
        assert_eq!(repo.inner.len(), 1);
    }

    #[tokio::test]
    async fn mint_rejects_invalid_url_before_touching_store() {
        let (service, repo, _cache) = service_with(RandomGenerator::new());

        for url in ["", "not-a-valid-url", "ftp://example.com", "javascript:alert(1)"] {
            let err = service.mint(url).await.unwrap_err();
            assert!(matches!(err, ShortenerError::InvalidUrl(_)), "accepted {url:?}");
        }
        assert_eq!(repo.inserts(), 0);
    }

    #[tokio::test]
    async fn mint_propagates_store_failures() {
        let cache = Arc::new(MokaKvCache::new());
        let service = ShortenerService::new(
            Arc::new(ReadOnlyRepository),
            Arc::clone(&cache),
            ScriptedGenerator::new(&["abc123"]),
            config(),
        );

        let err = service.mint("https://example.com").await.unwrap_err();
        assert!(matches!(err, ShortenerError::Storage(StorageError::Unavailable(_))));
        assert_eq!(cache.get("abc123").await.unwrap(), None);
    }

    #[tokio::test]
    async fn resolve_after_mint_is_served_from_cache() {
        let (service, repo, _cache) = service_with(RandomGenerator::new());
        let link = service.mint("https://example.com").await.unwrap();

        for _ in 0..3 {
            let url = service.resolve(&link.code).await.unwrap();
            assert_eq!(url.as_deref(), Some("https://example.com"));
        }

        assert_eq!(repo.gets(), 0);
        assert_eq!(service.counter.pending(&link.code).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn resolve_miss_reads_store_once_then_fills_cache() {
        let (service, repo, cache) = service_with(RandomGenerator::new());
        repo.inner.insert(&code("abc123"), "https://example.com").await.unwrap();

        let first = service.resolve(&code("abc123")).await.unwrap();
        let second = service.resolve(&code("abc123")).await.unwrap();

        assert_eq!(first.as_deref(), Some("https://example.com"));
        assert_eq!(second.as_deref(), Some("https://example.com"));
        assert_eq!(repo.gets(), 1);
        assert_eq!(
            cache.get("abc123").await.unwrap().as_deref(),
            Some("https://example.com")
        );
        assert_eq!(service.counter.pending(&code("abc123")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn resolve_unknown_code_is_not_cached_or_counted() {
        let (service, repo, cache) = service_with(RandomGenerator::new());

        assert_eq!(service.resolve(&code("nope00")).await.unwrap(), None);
        assert_eq!(service.resolve(&code("nope00")).await.unwrap(), None);

        // Every lookup of an unknown code goes back to the store.
        assert_eq!(repo.gets(), 2);
        assert_eq!(cache.get("nope00").await.unwrap(), None);
        assert_eq!(cache.get("stats:nope00").await.unwrap(), None);
    }

    #[tokio::test]
    async fn retire_removes_code_everywhere_and_is_idempotent() {
        let (service, repo, cache) = service_with(RandomGenerator::new());
        let link = service.mint("https://example.com").await.unwrap();

        assert!(service.retire(&link.code).await.unwrap());
        assert!(!service.retire(&link.code).await.unwrap());

        assert_eq!(cache.get(link.code.as_str()).await.unwrap(), None);
        assert!(repo.inner.get(&link.code).await.unwrap().is_none());
        assert_eq!(service.resolve(&link.code).await.unwrap(), None);
    }

    #[tokio::test]
    async fn retire_reports_store_failure_as_deletion_failed() {
        let cache = Arc::new(MokaKvCache::new());
        cache
            .set_ex("abc123", "https://example.com", std::time::Duration::from_secs(60))
            .await
            .unwrap();
        let service = ShortenerService::new(
            Arc::new(ReadOnlyRepository),
            Arc::clone(&cache),
            RandomGenerator::new(),
            config(),
        );

        let err = service.retire(&code("abc123")).await.unwrap_err();

        assert!(matches!(err, ShortenerError::DeletionFailed(_)));
        assert!(err.is_client_error());
        // The cache entry is gone even though the row could not be deleted.
        assert_eq!(cache.get("abc123").await.unwrap(), None);
    }
}
