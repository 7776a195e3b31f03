//! Background folding of cached access counters into durable storage.
//!
//! Every tick, one instance (whoever holds the lease) drains all
//! `stats:{code}` counters with an atomic get-and-delete and applies the
//! totals in a single repository batch. Draining is what makes each
//! counted access land exactly once: two racing ticks can never read the
//! same increment. The price is that a failed batch loses the drained
//! counts, which is logged as an error.

use crate::config::ConsolidationConfig;
use crate::counter::{code_from_key, STATS_PREFIX};
use crate::error::ConsolidationError;
use crate::lease::LeaseCoordinator;
use std::collections::BTreeMap;
use std::sync::Arc;
use tinylink_core::{KvCache, Repository, ShortCode};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another instance holds the lease.
    Skipped,
    /// Pending counters were drained and committed.
    Consolidated {
        /// Distinct codes with a non-zero count.
        codes: usize,
        /// Total accesses applied.
        accesses: u64,
        /// Rows that still existed and were updated.
        updated: u64,
    },
}

pub struct ConsolidationJob<R, C> {
    repository: Arc<R>,
    cache: Arc<C>,
    lease: LeaseCoordinator<C>,
    config: ConsolidationConfig,
}

impl<R: Repository, C: KvCache> ConsolidationJob<R, C> {
    pub fn new(repository: Arc<R>, cache: Arc<C>, config: ConsolidationConfig) -> Self {
        let lease = LeaseCoordinator::new(Arc::clone(&cache));
        Self::with_lease(repository, cache, lease, config)
    }

    /// Creates a job that competes for the lease through `lease`.
    pub fn with_lease(
        repository: Arc<R>,
        cache: Arc<C>,
        lease: LeaseCoordinator<C>,
        config: ConsolidationConfig,
    ) -> Self {
        Self {
            repository,
            cache,
            lease,
            config,
        }
    }

    /// Runs one tick.
    ///
    /// The lease is held only while the tick runs and is handed back
    /// afterwards, whether the batch committed or not.
    pub async fn run_once(&self) -> Result<TickOutcome, ConsolidationError> {
        let acquired = self
            .lease
            .try_acquire(&self.config.lease_name, self.config.lease_ttl)
            .await
            .map_err(ConsolidationError::Lease)?;
        if !acquired {
            return Ok(TickOutcome::Skipped);
        }

        let outcome = self.consolidate().await;

        if let Err(e) = self.lease.release(&self.config.lease_name).await {
            // Expires on its own after the lease TTL.
            warn!(lease = %self.config.lease_name, error = %e, "Failed to release lease");
        }
        outcome
    }

    async fn consolidate(&self) -> Result<TickOutcome, ConsolidationError> {
        let keys = self
            .cache
            .scan_prefix(STATS_PREFIX)
            .await
            .map_err(ConsolidationError::Scan)?;

        let mut totals: BTreeMap<ShortCode, u64> = BTreeMap::new();
        for key in keys {
            let raw = match self.cache.get_del(&key).await {
                Ok(Some(raw)) => raw,
                // Drained by someone else since the scan.
                Ok(None) => continue,
                Err(e) => {
                    // The key stays in place and is picked up next tick.
                    warn!(key = %key, error = %e, "Failed to drain access counter");
                    continue;
                }
            };

            let Some(code) = code_from_key(&key) else {
                continue;
            };
            match raw.parse::<u64>() {
                Ok(0) => {}
                Ok(count) => {
                    let total = totals.entry(ShortCode::new_unchecked(code)).or_default();
                    *total = total.saturating_add(count);
                }
                Err(_) => warn!(key = %key, value = %raw, "Dropping unparsable access counter"),
            }
        }

        if totals.is_empty() {
            return Ok(TickOutcome::Consolidated {
                codes: 0,
                accesses: 0,
                updated: 0,
            });
        }

        let deltas: Vec<(ShortCode, u64)> = totals.into_iter().collect();
        let accesses = deltas
            .iter()
            .fold(0u64, |sum, (_, count)| sum.saturating_add(*count));

        let updated = self
            .repository
            .apply_access_counts(&deltas)
            .await
            .map_err(|source| ConsolidationError::Apply {
                codes: deltas.len(),
                lost: accesses,
                source,
            })?;

        Ok(TickOutcome::Consolidated {
            codes: deltas.len(),
            accesses,
            updated,
        })
    }

    /// Starts the job on the current runtime.
    ///
    /// The first tick runs immediately. Cancellation is only observed
    /// between ticks, so a running batch always commits or rolls back.
    pub fn spawn(self) -> ConsolidationHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        ConsolidationHandle { cancel, task }
    }

    async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            lease = %self.config.lease_name,
            instance = %self.lease.instance_id(),
            "Consolidation job started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        info!("Consolidation job stopped");
    }

    async fn tick(&self) {
        match self.run_once().await {
            Ok(TickOutcome::Skipped) => {
                debug!("Consolidation lease held elsewhere, skipping tick")
            }
            Ok(TickOutcome::Consolidated { accesses: 0, .. }) => {
                debug!("No pending access counts")
            }
            Ok(TickOutcome::Consolidated {
                codes,
                accesses,
                updated,
            }) => info!(codes, accesses, updated, "Consolidated access counts"),
            Err(ConsolidationError::Apply { codes, lost, source }) => error!(
                target: "tinylink::consolidation",
                codes,
                lost,
                error = %source,
                "Access count batch rolled back, drained counts lost"
            ),
            Err(e) => warn!(error = %e, "Consolidation tick failed"),
        }
    }
}

/// Handle to a running [`ConsolidationJob`].
#[derive(Debug)]
pub struct ConsolidationHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ConsolidationHandle {
    /// Stops the job and waits for the current tick to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Consolidation task panicked");
        }
    }
}
