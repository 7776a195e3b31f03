use thiserror::Error;
use tinylink_core::{CacheError, StorageError};

/// Failures of a single consolidation tick.
///
/// None of these stop the job; the loop logs them and tries again on the
/// next tick.
#[derive(Debug, Clone, Error)]
pub enum ConsolidationError {
    #[error("failed to acquire consolidation lease: {0}")]
    Lease(CacheError),
    #[error("failed to list access counters: {0}")]
    Scan(CacheError),
    #[error("failed to apply {lost} accesses across {codes} codes: {source}")]
    Apply {
        codes: usize,
        lost: u64,
        source: StorageError,
    },
}
