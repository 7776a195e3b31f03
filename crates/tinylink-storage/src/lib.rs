//! Durable storage backends for short code mappings.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;
pub use tinylink_core::repository::{ReadRepository, Repository, Result, UrlRecord};
pub use tinylink_core::StorageError;
