// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync engine coordinator.
//!
//! The [`SyncEngine`] ties together the components of a dual-storage write:
//! - backend A (relational) and backend B (table API) stores
//! - the per-backend [`HealthTracker`] gate
//! - the [`ConsistencyEvaluator`] used for status checks and migration
//!
//! # Write path
//!
//! ```text
//! validate ──► A healthy? ──► upsert A (timeout) ──► record outcome
//!          └─► B enabled & healthy? ──► upsert B (timeout) ──► record outcome
//!                                 └─► consistency + degradation mode ──► DualStorageResult
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use content_sync::{SyncEngine, SyncConfig, ContentRecord, Payload, StoryPayload};
//! use content_sync::storage::memory::MemoryStore;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = SyncEngine::new(
//!     SyncConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     Some(Arc::new(MemoryStore::new())),
//! );
//!
//! let record = ContentRecord::new(
//!     "s1",
//!     "A",
//!     Payload::Story(StoryPayload { content: "Once upon a time".into(), ..Default::default() }),
//! );
//! let result = engine.write(&record).await.expect("valid record");
//! assert_eq!(result.consistency.to_string(), "full");
//! # }
//! ```

mod status;
mod types;
mod write;

pub use types::{
    BackendOutcome, Consistency, ConsistencyRequirement, DegradationMode, DualStorageResult, SyncStatus,
};

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::consistency::ConsistencyEvaluator;
use crate::record::ContentType;
use crate::resilience::health::{HealthTracker, StorageHealth};
use crate::storage::sql::SqlStore;
use crate::storage::table::TableStore;
use crate::storage::{Backend, ContentStore, StorageError};

/// Dual-storage sync engine.
///
/// Explicitly constructed and passed by reference; holds no global state.
pub struct SyncEngine {
    config: SyncConfig,
    health: Arc<HealthTracker>,
    store_a: Arc<dyn ContentStore>,
    /// `None` when backend B is disabled by configuration
    store_b: Option<Arc<dyn ContentStore>>,
    evaluator: Arc<ConsistencyEvaluator>,
}

impl SyncEngine {
    /// Build an engine over already-connected stores.
    ///
    /// A `store_b` is ignored when `config.backend_b_enabled` is false.
    pub fn new(
        config: SyncConfig,
        store_a: Arc<dyn ContentStore>,
        store_b: Option<Arc<dyn ContentStore>>,
    ) -> Self {
        let store_b = store_b.filter(|_| config.backend_b_enabled);
        let evaluator = Arc::new(ConsistencyEvaluator::new(
            Arc::clone(&store_a),
            store_b.clone(),
            config.consistency_threshold,
            config.timestamp_tolerance(),
        ));
        Self {
            health: Arc::new(HealthTracker::new(config.health_config())),
            config,
            store_a,
            store_b,
            evaluator,
        }
    }

    /// Connect both backends from configuration.
    ///
    /// Backend A is mandatory. Backend B is skipped when disabled or when no
    /// `table_api_url` is configured.
    pub async fn connect(config: SyncConfig) -> Result<Self, StorageError> {
        let sql_url = config
            .sql_url
            .as_deref()
            .ok_or_else(|| StorageError::Unavailable("backend A: sql_url is not configured".into()))?;
        let store_a: Arc<dyn ContentStore> = Arc::new(SqlStore::new(sql_url).await?);
        info!("Connected backend A");

        let store_b: Option<Arc<dyn ContentStore>> = match (config.backend_b_enabled, config.table_api_url.as_deref()) {
            (true, Some(url)) => {
                let store = TableStore::new(url, config.table_api_key.clone(), config.write_timeout())?;
                for (content_type, table) in &config.table_names {
                    if let Ok(content_type) = content_type.parse::<ContentType>() {
                        store.tables().register(content_type, table.clone());
                    }
                }
                info!(url = %url, "Configured backend B");
                Some(Arc::new(store))
            }
            (true, None) => {
                warn!("backend_b_enabled is set but table_api_url is missing; running on backend A alone");
                None
            }
            (false, _) => {
                info!("Backend B disabled by configuration");
                None
            }
        };

        Ok(Self::new(config, store_a, store_b))
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    #[must_use]
    pub fn evaluator(&self) -> &Arc<ConsistencyEvaluator> {
        &self.evaluator
    }

    /// The store behind `backend`, if it is enabled.
    #[must_use]
    pub fn store(&self, backend: Backend) -> Option<&Arc<dyn ContentStore>> {
        match backend {
            Backend::A => Some(&self.store_a),
            Backend::B => self.store_b.as_ref(),
        }
    }

    #[must_use]
    pub fn backend_b_enabled(&self) -> bool {
        self.store_b.is_some()
    }

    /// Health snapshot for one backend.
    #[must_use]
    pub fn backend_health(&self, backend: Backend) -> StorageHealth {
        self.health.snapshot(backend)
    }
}
