use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tinylink_core::error::StorageError;
use tinylink_core::repository::{ReadRepository, Repository, Result, UrlRecord};
use tinylink_core::shortcode::ShortCode;

/// In-memory storage entry for a URL mapping.
#[derive(Debug, Clone)]
struct Entry {
    original_url: String,
    access_count: u64,
}

impl Entry {
    fn to_record(&self) -> UrlRecord {
        UrlRecord {
            original_url: self.original_url.clone(),
            access_count: self.access_count,
        }
    }
}

/// DashMap-backed repository for tests and single-process deployments.
///
/// Inserts go through the entry API, so the uniqueness check and the write
/// happen under one shard lock. A batch of access counts is applied code by
/// code; nothing in memory can fail halfway through it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    storage: DashMap<String, Entry>,
}

impl InMemoryRepository {
    /// Creates a new in-memory repository.
    pub fn new() -> Self {
        Self {
            storage: DashMap::new(),
        }
    }

    /// Number of stored mappings.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[async_trait]
impl ReadRepository for InMemoryRepository {
    async fn get(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        Ok(self.storage.get(code.as_str()).map(|entry| entry.to_record()))
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn insert(&self, code: &ShortCode, original_url: &str) -> Result<()> {
        match self.storage.entry(code.as_str().to_owned()) {
            MapEntry::Occupied(_) => Err(StorageError::Conflict(code.to_string())),
            MapEntry::Vacant(slot) => {
                slot.insert(Entry {
                    original_url: original_url.to_owned(),
                    access_count: 0,
                });
                Ok(())
            }
        }
    }

    async fn delete(&self, code: &ShortCode) -> Result<bool> {
        Ok(self.storage.remove(code.as_str()).is_some())
    }

    async fn apply_access_counts(&self, deltas: &[(ShortCode, u64)]) -> Result<u64> {
        let mut updated = 0;
        for (code, delta) in deltas {
            if let Some(mut entry) = self.storage.get_mut(code.as_str()) {
                entry.access_count = entry.access_count.saturating_add(*delta);
                updated += 1;
            }
        }
        Ok(updated)
    }
}
