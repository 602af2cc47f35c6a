use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::{ContentRecord, ContentType, RecordKey};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record not found")]
    NotFound,
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed record from backend: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Short category label for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Backend(_) => "backend",
            Self::Timeout(_) => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// CRUD-by-key content store. Both backends implement this.
///
/// Writes are upserts keyed by `(content_type, id)`, so repeating a write is
/// always safe. There is no delete: archival is a status change.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get(&self, key: &RecordKey) -> Result<Option<ContentRecord>, StorageError>;

    /// Insert or replace. Returns the record as stored (a backend may stamp
    /// its own timestamps).
    async fn upsert(&self, record: &ContentRecord) -> Result<ContentRecord, StorageError>;

    /// One page of records of a type, ordered by id.
    /// Returns an empty vec once `offset` passes the end.
    async fn list(
        &self,
        content_type: ContentType,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<ContentRecord>, StorageError>;

    async fn count(&self, content_type: ContentType) -> Result<u64, StorageError>;

    /// Count across every content type.
    async fn count_all(&self) -> Result<u64, StorageError> {
        let mut total = 0;
        for content_type in ContentType::ALL {
            total += self.count(content_type).await?;
        }
        Ok(total)
    }

    /// Upsert many records. Default implementation falls back to sequential upserts.
    async fn upsert_batch(&self, records: &[ContentRecord]) -> Result<usize, StorageError> {
        for record in records {
            self.upsert(record).await?;
        }
        Ok(records.len())
    }
}
