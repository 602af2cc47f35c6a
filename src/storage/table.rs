// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backend-as-a-service table API (backend B).
//!
//! Speaks the PostgREST dialect exposed by hosted BaaS providers. One table
//! per content type, resolved through [`TableRegistry`]:
//!
//! ```text
//! GET  /rest/v1/stories?id=eq.s1&select=*                  → [row] | []
//! POST /rest/v1/stories?on_conflict=id                     → [row as stored]
//!      Prefer: resolution=merge-duplicates,return=representation
//! GET  /rest/v1/stories?select=*&order=id.asc&offset=0&limit=50
//! GET  /rest/v1/stories?select=id&limit=1                  → Content-Range: 0-0/123
//!      Prefer: count=exact
//! ```
//!
//! Rows are flat: the record fields plus `payload` as a JSON column. The
//! service stamps its own `updated_at` on write, so [`ContentStore::upsert`]
//! returns the row it sent back.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::traits::{ContentStore, StorageError};
use crate::record::{ContentRecord, ContentStatus, ContentType, Payload, RecordKey};

/// Maps content types to table names.
///
/// Defaults: `stories`, `scenarios`, `prompts`, `video_jobs`.
#[derive(Debug, Default)]
pub struct TableRegistry {
    overrides: RwLock<HashMap<ContentType, String>>,
}

impl TableRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a content type to a custom table.
    pub fn register(&self, content_type: ContentType, table: impl Into<String>) {
        self.overrides.write().insert(content_type, table.into());
    }

    #[must_use]
    pub fn table_for(&self, content_type: ContentType) -> String {
        if let Some(table) = self.overrides.read().get(&content_type) {
            return table.clone();
        }
        match content_type {
            ContentType::Story => "stories",
            ContentType::Scenario => "scenarios",
            ContentType::Prompt => "prompts",
            ContentType::VideoJob => "video_jobs",
        }
        .to_string()
    }
}

/// Wire shape of one table row.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableRow {
    id: String,
    title: String,
    #[serde(default)]
    owner_id: Option<String>,
    status: ContentStatus,
    payload: Payload,
    #[serde(default)]
    project_id: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TableRow {
    fn from_record(record: &ContentRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            owner_id: record.owner_id.clone(),
            status: record.status,
            payload: record.payload.clone(),
            project_id: record.project_id.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn into_record(self, content_type: ContentType) -> Result<ContentRecord, StorageError> {
        if self.payload.content_type() != content_type {
            return Err(StorageError::Serialization(format!(
                "row '{}' in {} table carries a {} payload",
                self.id,
                content_type,
                self.payload.content_type()
            )));
        }
        Ok(ContentRecord {
            id: self.id,
            content_type,
            title: self.title,
            owner_id: self.owner_id,
            status: self.status,
            payload: self.payload,
            created_at: self.created_at,
            updated_at: self.updated_at,
            project_id: self.project_id,
        })
    }
}

pub struct TableStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    tables: TableRegistry,
}

impl TableStore {
    /// Create a client for the table API at `base_url` (without `/rest/v1`).
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            tables: TableRegistry::new(),
        })
    }

    #[must_use]
    pub fn with_tables(mut self, tables: TableRegistry) -> Self {
        self.tables = tables;
        self
    }

    #[must_use]
    pub fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    fn url(&self, content_type: ContentType) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.tables.table_for(content_type))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.api_key {
            Some(ref key) => builder.header("apikey", key).bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StorageError> {
        let response = self.authorized(builder).send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => StorageError::NotFound,
            StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::BAD_GATEWAY
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS => {
                StorageError::Unavailable(format!("{}: {}", status, body))
            }
            _ => StorageError::Backend(format!("{}: {}", status, body)),
        })
    }

    async fn rows(response: Response, content_type: ContentType) -> Result<Vec<ContentRecord>, StorageError> {
        let rows: Vec<TableRow> = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        rows.into_iter().map(|r| r.into_record(content_type)).collect()
    }
}

fn map_reqwest_error(err: reqwest::Error) -> StorageError {
    if err.is_timeout() {
        StorageError::Timeout(Duration::ZERO)
    } else if err.is_connect() {
        StorageError::Unavailable(err.to_string())
    } else {
        StorageError::Backend(err.to_string())
    }
}

/// Total from a `Content-Range: 0-0/123` (or `*/0`) header.
fn parse_content_range_total(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.trim().parse().ok()
}

#[async_trait]
impl ContentStore for TableStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<ContentRecord>, StorageError> {
        let request = self
            .client
            .get(self.url(key.content_type))
            .query(&[("id", format!("eq.{}", key.id)), ("select", "*".to_string())]);
        let response = self.send(request).await?;
        Ok(Self::rows(response, key.content_type).await?.into_iter().next())
    }

    async fn upsert(&self, record: &ContentRecord) -> Result<ContentRecord, StorageError> {
        let request = self
            .client
            .post(self.url(record.content_type))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[TableRow::from_record(record)]);
        let response = self.send(request).await?;
        Self::rows(response, record.content_type)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::Backend("upsert returned no representation".into()))
    }

    async fn list(
        &self,
        content_type: ContentType,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<ContentRecord>, StorageError> {
        let request = self.client.get(self.url(content_type)).query(&[
            ("select", "*".to_string()),
            ("order", "id.asc".to_string()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ]);
        let response = self.send(request).await?;
        Self::rows(response, content_type).await
    }

    async fn count(&self, content_type: ContentType) -> Result<u64, StorageError> {
        let request = self
            .client
            .get(self.url(content_type))
            .query(&[("select", "id"), ("limit", "1")])
            .header("Prefer", "count=exact");
        let response = self.send(request).await?;
        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| StorageError::Serialization("missing Content-Range total".into()))
    }

    async fn upsert_batch(&self, records: &[ContentRecord]) -> Result<usize, StorageError> {
        let mut by_type: HashMap<ContentType, Vec<TableRow>> = HashMap::new();
        for record in records {
            by_type
                .entry(record.content_type)
                .or_default()
                .push(TableRow::from_record(record));
        }
        for (content_type, rows) in by_type {
            let request = self
                .client
                .post(self.url(content_type))
                .query(&[("on_conflict", "id")])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&rows);
            self.send(request).await?;
        }
        Ok(records.len())
    }
}
