// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Relational storage backend (backend A).
//!
//! One table holds every content type, keyed by `(content_type, id)`:
//! ```sql
//! CREATE TABLE content_records (
//!   id VARCHAR(255) NOT NULL,
//!   content_type VARCHAR(32) NOT NULL,
//!   title TEXT NOT NULL,
//!   owner_id VARCHAR(255),
//!   status VARCHAR(32) NOT NULL,
//!   payload LONGTEXT NOT NULL,   -- tagged payload JSON
//!   project_id VARCHAR(255),
//!   created_at BIGINT NOT NULL,
//!   updated_at BIGINT NOT NULL,
//!   PRIMARY KEY (content_type, id)
//! )
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! The `Any` driver has no JSON type mapping and hands MySQL TEXT columns back
//! as bytes, so text columns are read as `String` first and `Vec<u8>` second.

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};

use super::traits::{ContentStore, StorageError};
use crate::record::{ContentRecord, ContentStatus, ContentType, Payload, RecordKey};
use crate::resilience::retry::{retry, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

const COLUMNS: &str =
    "id, content_type, title, owner_id, status, payload, project_id, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Sqlite,
    Mysql,
}

pub struct SqlStore {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlStore {
    /// Connect with startup-mode retry (fails fast if config is wrong) and
    /// create the table if needed.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        install_drivers();

        let dialect = if connection_string.starts_with("sqlite:") {
            Dialect::Sqlite
        } else if connection_string.starts_with("mysql:") {
            Dialect::Mysql
        } else {
            return Err(StorageError::Backend(format!(
                "unsupported SQL url scheme: {}",
                connection_string.split(':').next().unwrap_or_default()
            )));
        };

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(if dialect == Dialect::Sqlite { 1 } else { 20 })
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        let store = Self { pool, dialect };
        if dialect == Dialect::Sqlite {
            store.enable_wal_mode().await?;
        }
        store.init_schema().await?;
        Ok(store)
    }

    /// Clone of the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {}", e)))?;
        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let sql = match self.dialect {
            Dialect::Sqlite => {
                r#"
                CREATE TABLE IF NOT EXISTS content_records (
                    id TEXT NOT NULL,
                    content_type TEXT NOT NULL,
                    title TEXT NOT NULL,
                    owner_id TEXT,
                    status TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    project_id TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (content_type, id)
                )
                "#
            }
            Dialect::Mysql => {
                r#"
                CREATE TABLE IF NOT EXISTS content_records (
                    id VARCHAR(255) NOT NULL,
                    content_type VARCHAR(32) NOT NULL,
                    title TEXT NOT NULL,
                    owner_id VARCHAR(255),
                    status VARCHAR(32) NOT NULL,
                    payload LONGTEXT NOT NULL,
                    project_id VARCHAR(255),
                    created_at BIGINT NOT NULL,
                    updated_at BIGINT NOT NULL,
                    PRIMARY KEY (content_type, id),
                    INDEX idx_updated_at (updated_at)
                )
                "#
            }
        };

        retry("sql_init_schema", &RetryConfig::startup(), || async {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;
        Ok(())
    }

    fn upsert_sql(&self) -> &'static str {
        match self.dialect {
            Dialect::Sqlite => {
                "INSERT INTO content_records (id, content_type, title, owner_id, status, payload, project_id, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(content_type, id) DO UPDATE SET
                    title = excluded.title,
                    owner_id = excluded.owner_id,
                    status = excluded.status,
                    payload = excluded.payload,
                    project_id = excluded.project_id,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at"
            }
            Dialect::Mysql => {
                "INSERT INTO content_records (id, content_type, title, owner_id, status, payload, project_id, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON DUPLICATE KEY UPDATE
                    title = VALUES(title),
                    owner_id = VALUES(owner_id),
                    status = VALUES(status),
                    payload = VALUES(payload),
                    project_id = VALUES(project_id),
                    created_at = VALUES(created_at),
                    updated_at = VALUES(updated_at)"
            }
        }
    }
}

/// Read a text column as String (SQLite) or bytes (MySQL TEXT).
fn text_column(row: &AnyRow, name: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(name)
        .ok()
        .flatten()
        .or_else(|| {
            row.try_get::<Option<Vec<u8>>, _>(name)
                .ok()
                .flatten()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
}

fn required_text(row: &AnyRow, name: &str) -> Result<String, StorageError> {
    text_column(row, name).ok_or_else(|| StorageError::Serialization(format!("column '{}' is missing", name)))
}

fn record_from_row(row: &AnyRow) -> Result<ContentRecord, StorageError> {
    let content_type: ContentType = required_text(row, "content_type")?
        .parse()
        .map_err(StorageError::Serialization)?;
    let status: ContentStatus = required_text(row, "status")?
        .parse()
        .map_err(StorageError::Serialization)?;
    let payload: Payload = serde_json::from_str(&required_text(row, "payload")?)
        .map_err(|e| StorageError::Serialization(format!("payload: {}", e)))?;

    Ok(ContentRecord {
        id: required_text(row, "id")?,
        content_type,
        title: required_text(row, "title")?,
        owner_id: text_column(row, "owner_id"),
        status,
        payload,
        created_at: row.try_get("created_at").map_err(|e| StorageError::Serialization(e.to_string()))?,
        updated_at: row.try_get("updated_at").map_err(|e| StorageError::Serialization(e.to_string()))?,
        project_id: text_column(row, "project_id"),
    })
}

#[async_trait]
impl ContentStore for SqlStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<ContentRecord>, StorageError> {
        let sql = format!("SELECT {} FROM content_records WHERE content_type = ? AND id = ?", COLUMNS);

        retry("sql_get", &RetryConfig::query(), || async {
            let row = sqlx::query(&sql)
                .bind(key.content_type.as_str())
                .bind(&key.id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            row.as_ref().map(record_from_row).transpose()
        })
        .await
    }

    async fn upsert(&self, record: &ContentRecord) -> Result<ContentRecord, StorageError> {
        let payload = serde_json::to_string(&record.payload)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        // Single attempt: retry policy for writes belongs to the caller.
        sqlx::query(self.upsert_sql())
            .bind(&record.id)
            .bind(record.content_type.as_str())
            .bind(&record.title)
            .bind(&record.owner_id)
            .bind(record.status.as_str())
            .bind(&payload)
            .bind(&record.project_id)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(record.clone())
    }

    async fn list(
        &self,
        content_type: ContentType,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<ContentRecord>, StorageError> {
        let sql = format!(
            "SELECT {} FROM content_records WHERE content_type = ? ORDER BY id LIMIT ? OFFSET ?",
            COLUMNS
        );

        retry("sql_list", &RetryConfig::query(), || async {
            let rows = sqlx::query(&sql)
                .bind(content_type.as_str())
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            rows.iter().map(record_from_row).collect()
        })
        .await
    }

    async fn count(&self, content_type: ContentType) -> Result<u64, StorageError> {
        retry("sql_count", &RetryConfig::query(), || async {
            let row = sqlx::query("SELECT COUNT(*) AS n FROM content_records WHERE content_type = ?")
                .bind(content_type.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let n: i64 = row.try_get("n").map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(n.max(0) as u64)
        })
        .await
    }

    async fn upsert_batch(&self, records: &[ContentRecord]) -> Result<usize, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        for record in records {
            let payload = serde_json::to_string(&record.payload)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            sqlx::query(self.upsert_sql())
                .bind(&record.id)
                .bind(record.content_type.as_str())
                .bind(&record.title)
                .bind(&record.owner_id)
                .bind(record.status.as_str())
                .bind(&payload)
                .bind(&record.project_id)
                .bind(record.created_at)
                .bind(record.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(records.len())
    }
}
