//! URL shortener service implementation.
//!
//! This crate ties the core seams together: [`ShortenerService`] mints,
//! resolves and retires short links over a [`Repository`](tinylink_core::Repository)
//! and a [`KvCache`](tinylink_core::KvCache), and the [`ConsolidationJob`]
//! folds the per-link access counters kept in the cache back into durable
//! storage.

pub mod config;
pub mod consolidation;
pub mod counter;
pub mod error;
pub mod generator;
pub mod lease;
pub mod service;

pub use config::{ConsolidationConfig, ShortenerConfig};
pub use consolidation::{ConsolidationHandle, ConsolidationJob, TickOutcome};
pub use counter::AccessCounter;
pub use error::ConsolidationError;
pub use generator::{Generator, RandomGenerator};
pub use lease::LeaseCoordinator;
pub use service::ShortenerService;
