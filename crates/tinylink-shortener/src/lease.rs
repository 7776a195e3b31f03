use std::sync::Arc;
use std::time::Duration;
use tinylink_core::cache::{KvCache, Result};
use tracing::{debug, trace};
use uuid::Uuid;

/// Cross-instance mutual exclusion built on the cache's set-if-absent.
///
/// A lease is a cache key holding the id of the instance that took it. It
/// is never renewed: it expires after its TTL whether or not the holder is
/// still alive, so work done under a lease must fit well inside the TTL.
#[derive(Debug)]
pub struct LeaseCoordinator<C> {
    cache: Arc<C>,
    instance_id: String,
}

impl<C> Clone for LeaseCoordinator<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            instance_id: self.instance_id.clone(),
        }
    }
}

impl<C: KvCache> LeaseCoordinator<C> {
    /// Creates a coordinator with a random instance id.
    pub fn new(cache: Arc<C>) -> Self {
        Self::with_instance_id(cache, Uuid::new_v4().to_string())
    }

    pub fn with_instance_id(cache: Arc<C>, instance_id: impl Into<String>) -> Self {
        Self {
            cache,
            instance_id: instance_id.into(),
        }
    }

    /// The value written into leases this coordinator holds.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Takes the lease `name` for `ttl` if nobody holds it.
    pub async fn try_acquire(&self, name: &str, ttl: Duration) -> Result<bool> {
        let acquired = self.cache.set_nx_ex(name, &self.instance_id, ttl).await?;
        trace!(lease = name, instance = %self.instance_id, acquired, "Lease attempt");
        Ok(acquired)
    }

    /// Gives up the lease `name` early if this instance still holds it.
    ///
    /// The check and the delete are two operations; if the lease expires in
    /// between and a peer takes it, the peer's lease is removed. The TTL
    /// bounds the damage.
    pub async fn release(&self, name: &str) -> Result<bool> {
        match self.cache.get(name).await? {
            Some(holder) if holder == self.instance_id => {
                self.cache.del(name).await?;
                debug!(lease = name, instance = %self.instance_id, "Lease released");
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
