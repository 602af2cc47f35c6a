//! # Content Sync
//!
//! Dual-storage synchronization and consistency engine for user-generated
//! content (stories, scenarios, prompts, video jobs).
//!
//! ## Architecture
//!
//! Every record is written redundantly to two heterogeneous backends so the
//! application survives a provider outage and can move between providers
//! without downtime.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Schema contracts                        │
//! │  • Every record validated before any I/O                    │
//! │  • Every result and report validated before it is returned  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Dual-storage writer                       │
//! │  • Backend A then backend B, each under a timeout           │
//! │  • Health gate per backend (threshold + cool-down)          │
//! │  • Consistency full / partial / failed + degradation mode   │
//! └─────────────────────────────────────────────────────────────┘
//!                │                                 │
//!                ▼                                 ▼
//! ┌───────────────────────────┐     ┌───────────────────────────┐
//! │  Backend A: SQL (sqlx)    │     │  Backend B: table API     │
//! │  SQLite / MySQL           │     │  PostgREST over reqwest   │
//! └───────────────────────────┘     └───────────────────────────┘
//!                │                                 │
//!                └───────────────┬─────────────────┘
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Consistency evaluator + migration              │
//! │  • Field-by-field comparison, quality score 0-100           │
//! │  • Batched backfill with backup, retries, rollback plan     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use content_sync::{ContentRecord, Payload, StoryPayload, SyncConfig, SyncEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig {
//!         sql_url: Some("sqlite://content.db?mode=rwc".into()),
//!         table_api_url: Some("https://project.example.com".into()),
//!         ..Default::default()
//!     };
//!     let engine = Arc::new(SyncEngine::connect(config).await?);
//!
//!     let record = ContentRecord::new(
//!         "s1",
//!         "The Lighthouse",
//!         Payload::Story(StoryPayload { content: "It was a dark night.".into(), ..Default::default() }),
//!     );
//!     let result = engine.write(&record).await?;
//!     println!("{} ({})", result.consistency, result.degradation_mode);
//!
//!     let status = engine.sync_status(&record.key()).await;
//!     println!("score {}", status.quality.score);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: the [`SyncEngine`] and its dual write
//! - [`storage`]: backends (SQL, table API, memory)
//! - [`schema`]: validation contracts
//! - [`resilience`]: health gate and retry policies
//! - [`consistency`]: cross-backend comparison and quality scoring
//! - [`migration`]: backfill runs, backups, rollback, integrity checks

pub mod config;
pub mod record;
pub mod schema;
pub mod storage;
pub mod resilience;
pub mod coordinator;
pub mod consistency;
pub mod migration;
pub mod metrics;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::{ConfigError, SyncConfig};
pub use record::{
    ContentRecord, ContentStatus, ContentType, Payload, PromptPayload, RecordKey, ScenarioPayload, StoryPayload,
    VideoJobPayload,
};
pub use coordinator::{
    BackendOutcome, Consistency, ConsistencyRequirement, DegradationMode, DualStorageResult, SyncEngine, SyncStatus,
};
pub use consistency::{ConsistencyEvaluator, DataQualityReport, QualityMetrics, Severity, Violation};
pub use migration::{
    IntegrityChecker, IntegrityReport, MigrationDirection, MigrationError, MigrationOptions, MigrationRecordError,
    MigrationReport, MigrationService, RollbackPlan, RollbackStep,
};
pub use schema::{Validate, ValidationError};
pub use storage::{Backend, ContentStore, StorageError};
pub use resilience::{HealthConfig, HealthTracker, RetryConfig, StorageHealth};
pub use metrics::LatencyTimer;
