//! Core types and traits for the tinylink URL shortener.
//!
//! This crate provides the domain types ([`ShortCode`], [`UrlRecord`]) and
//! the seams the shortener is built on: the durable [`Repository`], the
//! key-value [`KvCache`] and the request-facing [`Shortener`].

pub mod cache;
pub mod error;
pub mod repository;
pub mod shortcode;
pub mod shortener;
pub mod validation;

pub use cache::KvCache;
pub use error::{CacheError, ShortenerError, StorageError};
pub use repository::{ReadRepository, Repository, UrlRecord};
pub use shortcode::ShortCode;
pub use shortener::{ShortLink, Shortener};
