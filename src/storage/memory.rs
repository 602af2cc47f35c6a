use async_trait::async_trait;
use dashmap::DashMap;

use super::traits::{ContentStore, StorageError};
use crate::record::{ContentRecord, ContentType, RecordKey};

/// In-process store keyed by `(content_type, id)`.
pub struct MemoryStore {
    data: DashMap<RecordKey, ContentRecord>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Seed a store with records (bypasses nothing; same as upserting each).
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = ContentRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.data.insert(record.key(), record);
        }
        store
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&self) {
        self.data.clear();
    }

    /// Snapshot of one record without going through the async trait.
    #[must_use]
    pub fn peek(&self, key: &RecordKey) -> Option<ContentRecord> {
        self.data.get(key).map(|r| r.value().clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<ContentRecord>, StorageError> {
        Ok(self.peek(key))
    }

    async fn upsert(&self, record: &ContentRecord) -> Result<ContentRecord, StorageError> {
        self.data.insert(record.key(), record.clone());
        Ok(record.clone())
    }

    async fn list(
        &self,
        content_type: ContentType,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<ContentRecord>, StorageError> {
        let mut records: Vec<ContentRecord> = self
            .data
            .iter()
            .filter(|r| r.key().content_type == content_type)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records
            .into_iter()
            .skip(offset as usize)
            .take(limit)
            .collect())
    }

    async fn count(&self, content_type: ContentType) -> Result<u64, StorageError> {
        Ok(self
            .data
            .iter()
            .filter(|r| r.key().content_type == content_type)
            .count() as u64)
    }
}
