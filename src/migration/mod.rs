// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batch migration and backfill between the two backends.
//!
//! A run pages through the source backend and rewrites every record through
//! [`SyncEngine::write`], so each record lands on both sides. Both sides are
//! therefore snapshotted before the first write.
//!
//! ```text
//! count source ──► snapshot source + target ──► RollbackPlan
//!                                          │
//!     ┌────────────────────────────────────┘
//!     ▼
//!   page ──► [pause] ──► per record:  validate ──► assess ──► prepare ──► write (retry)
//!     ▲                                   │           │                      │
//!     │                                 skip        skip              succeed / fail
//!     └──────── next page (cancel checked here) ◄──────────────────────────┘
//!                                          │
//!                          sampled consistency check ──► MigrationReport
//! ```
//!
//! Record failures are data in the [`MigrationReport`]. Only setup problems
//! (bad options, a failed backup, an unreadable source) are returned as
//! [`MigrationError`].

pub mod backup;
pub mod integrity;
pub mod report;
pub mod transform;

pub use backup::{
    restore_backup, restore_into, BackupManifest, BackupWriter, RestoreSummary, RollbackPlan, RollbackStep,
};
pub use integrity::{IntegrityChecker, IntegrityReport};
pub use report::{MigrationRecordError, MigrationReport, RecordState, SYSTEM_SCOPE};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SyncConfig;
use crate::consistency::{sample_evenly, DataQualityReport, Severity};
use crate::coordinator::{Consistency, DualStorageResult, SyncEngine};
use crate::record::{now_millis, ContentRecord, ContentType, RecordKey};
use crate::resilience::retry::{retry_if, RetryConfig};
use crate::schema::{Validate, ValidationError};
use crate::storage::{Backend, ContentStore};

#[derive(Error, Debug)]
pub enum MigrationError {
    /// The run could not continue. `report` holds whatever was done so far.
    #[error("Migration aborted: {}", error.error)]
    System {
        error: MigrationRecordError,
        report: Box<MigrationReport>,
    },
    #[error("Invalid migration options: {0}")]
    Validation(String),
    #[error("Backup failed: {0}")]
    Backup(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which backend is read and which one the run overwrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationDirection {
    #[serde(rename = "a-to-b")]
    AToB,
    #[serde(rename = "b-to-a")]
    BToA,
}

impl MigrationDirection {
    #[must_use]
    pub fn source(self) -> Backend {
        match self {
            Self::AToB => Backend::A,
            Self::BToA => Backend::B,
        }
    }

    #[must_use]
    pub fn target(self) -> Backend {
        self.source().other()
    }
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AToB => f.write_str("a-to-b"),
            Self::BToA => f.write_str("b-to-a"),
        }
    }
}

impl FromStr for MigrationDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a-to-b" => Ok(Self::AToB),
            "b-to-a" => Ok(Self::BToA),
            other => Err(format!("unknown direction '{}', expected a-to-b or b-to-a", other)),
        }
    }
}

/// Per-run options. Defaults come from [`SyncConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Transform and validate only; nothing is written and no backup is taken
    pub dry_run: bool,
    pub batch_size: usize,
    /// Write attempts per record, including the first
    pub max_retries: u32,
    pub create_backup: bool,
    pub direction: MigrationDirection,
    /// Records in flight within one batch
    pub concurrency: usize,
    /// Restrict the run to these types; empty means all
    pub content_types: Vec<ContentType>,
}

impl MigrationOptions {
    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            create_backup: config.create_backup,
            direction: MigrationDirection::AToB,
            concurrency: config.migration_concurrency,
            content_types: Vec::new(),
        }
    }

    fn check(&self) -> Result<(), MigrationError> {
        if self.batch_size == 0 {
            return Err(MigrationError::Validation("batch_size must be at least 1".into()));
        }
        if self.max_retries == 0 {
            return Err(MigrationError::Validation("max_retries must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(MigrationError::Validation("concurrency must be at least 1".into()));
        }
        Ok(())
    }

    fn types(&self) -> Vec<ContentType> {
        if self.content_types.is_empty() {
            ContentType::ALL.to_vec()
        } else {
            self.content_types.clone()
        }
    }
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Why a migration write did not reach both backends.
#[derive(Debug)]
enum WriteFailure {
    Invalid(ValidationError),
    Degraded(DualStorageResult),
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(e) => write!(f, "{}", e),
            Self::Degraded(r) => match r.error_summary() {
                Some(summary) => write!(f, "{} write: {}", r.consistency, summary),
                None => write!(f, "{} write", r.consistency),
            },
        }
    }
}

impl WriteFailure {
    /// Retrying only helps when both backends were actually attempted.
    fn retryable(&self) -> bool {
        match self {
            Self::Invalid(_) => false,
            Self::Degraded(r) => r.backend_a.attempted && r.backend_b.attempted,
        }
    }
}

struct RecordOutcome {
    key: RecordKey,
    state: RecordState,
    error: Option<MigrationRecordError>,
    /// Pre-write assessment, kept for dry-run reporting
    quality: Option<DataQualityReport>,
}

fn advance(state: &mut RecordState, next: RecordState) {
    debug_assert!(state.can_transition_to(next), "illegal transition {:?} -> {:?}", state, next);
    *state = next;
}

/// Everything a spawned per-record task needs.
struct RecordMigrator {
    engine: Arc<SyncEngine>,
    retry: RetryConfig,
    skip_threshold: u8,
    dry_run: bool,
    target: Backend,
}

impl RecordMigrator {
    fn invalid_after_prepare(key: &RecordKey, e: &ValidationError) -> MigrationRecordError {
        MigrationRecordError::new(
            key.to_string(),
            e.to_string(),
            Severity::Critical,
            false,
            format!("normalization produced an invalid record at '{}'; inspect the source data", e.path),
        )
    }

    async fn migrate(&self, record: ContentRecord) -> RecordOutcome {
        let key = record.key();
        let mut state = RecordState::Pending;
        advance(&mut state, RecordState::Validating);

        if let Err(e) = record.validate() {
            advance(&mut state, RecordState::Skipped);
            return RecordOutcome {
                error: Some(MigrationRecordError::new(
                    key.to_string(),
                    format!("invalid record: {}", e),
                    Severity::Warning,
                    true,
                    "fix the record on the source backend and rerun",
                )),
                key,
                state,
                quality: None,
            };
        }

        let quality = self.engine.evaluator().assess(&record);
        if quality.score < self.skip_threshold {
            advance(&mut state, RecordState::Skipped);
            return RecordOutcome {
                error: Some(MigrationRecordError::new(
                    key.to_string(),
                    format!("quality score {} below {}", quality.score, self.skip_threshold),
                    Severity::Warning,
                    true,
                    "repair the flagged fields on the source backend and rerun",
                )),
                key,
                state,
                quality: Some(quality),
            };
        }

        advance(&mut state, RecordState::Writing);
        let prepared = transform::prepare(&record);

        if self.dry_run {
            if let Err(e) = prepared.validate() {
                advance(&mut state, RecordState::Failed);
                let error = Self::invalid_after_prepare(&key, &e);
                warn!(key = %key, error = %error.error, "Dry run: prepared record is invalid");
                return RecordOutcome { key, state, error: Some(error), quality: Some(quality) };
            }
            debug!(key = %key, "Dry run: would write");
            advance(&mut state, RecordState::Succeeded);
            let quality = self.engine.evaluator().assess(&prepared);
            return RecordOutcome { key, state, error: None, quality: Some(quality) };
        }

        let engine = &self.engine;
        let prepared = &prepared;
        let result = retry_if(
            &format!("migrate {}", key),
            &self.retry,
            || async move {
                match engine.write(prepared).await {
                    Ok(r) if r.consistency == Consistency::Full => Ok(r),
                    Ok(r) => Err(WriteFailure::Degraded(r)),
                    Err(e) => Err(WriteFailure::Invalid(e)),
                }
            },
            WriteFailure::retryable,
        )
        .await;

        match result {
            Ok(_) => {
                advance(&mut state, RecordState::Succeeded);
                RecordOutcome { key, state, error: None, quality: Some(quality) }
            }
            Err(failure) => {
                advance(&mut state, RecordState::Failed);
                let error = match failure {
                    WriteFailure::Invalid(ref e) => Self::invalid_after_prepare(&key, e),
                    WriteFailure::Degraded(ref r) => MigrationRecordError::new(
                        key.to_string(),
                        failure.to_string(),
                        if r.success { Severity::Warning } else { Severity::Critical },
                        true,
                        format!("rerun once {} is healthy; writes are idempotent upserts", self.target),
                    ),
                };
                warn!(key = %key, error = %error.error, "Record migration failed");
                RecordOutcome { key, state, error: Some(error), quality: Some(quality) }
            }
        }
    }
}

/// Resolves once cancellation is requested. Never resolves if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|c| *c).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

/// Drives migration runs over a shared engine.
pub struct MigrationService {
    engine: Arc<SyncEngine>,
}

impl MigrationService {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self { engine }
    }

    /// Run to completion without external cancellation.
    pub async fn run_migration(&self, options: MigrationOptions) -> Result<MigrationReport, MigrationError> {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.run_migration_with_cancel(options, cancel_rx).await
    }

    /// Run until done or until `cancel` turns true. Cancellation is checked
    /// between batches; records already in flight finish.
    #[instrument(skip_all, fields(direction = %options.direction, dry_run = options.dry_run))]
    pub async fn run_migration_with_cancel(
        &self,
        options: MigrationOptions,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<MigrationReport, MigrationError> {
        let start = Instant::now();
        options.check()?;
        let config = self.engine.config();
        let source_backend = options.direction.source();
        let target_backend = options.direction.target();

        let (Some(source), Some(target)) = (self.engine.store(source_backend), self.engine.store(target_backend))
        else {
            return Err(MigrationError::Validation(
                "migration needs both backends but backendB is disabled".into(),
            ));
        };
        let (source, target) = (Arc::clone(source), Arc::clone(target));
        let types = options.types();

        let mut total = 0u64;
        for content_type in &types {
            match source.count(*content_type).await {
                Ok(n) => total += n,
                Err(e) => {
                    return Err(self.abort(
                        MigrationReport::empty(0, options.dry_run),
                        format!("counting {} on {}: {}", content_type, source_backend, e),
                        format!("check connectivity and credentials for {}", source_backend),
                        start,
                    ))
                }
            }
        }
        info!(total, source = %source_backend, target = %target_backend, "Starting migration");
        let mut report = MigrationReport::empty(total, options.dry_run);

        if options.create_backup && !options.dry_run {
            let identifier = format!("backup-{}-{}", options.direction, now_millis());
            let writer = BackupWriter::new(&config.backup_dir, options.batch_size);
            // The dual writer rewrites the source too, so both sides need a snapshot.
            let manifests = vec![
                writer.snapshot(source.as_ref(), source_backend, &identifier).await?,
                writer.snapshot(target.as_ref(), target_backend, &identifier).await?,
            ];
            let plan = RollbackPlan::build(identifier.as_str(), &manifests);
            plan.save(config.backup_dir.join(format!("{}.plan.json", identifier))).await?;
            report.rollback_plan = Some(plan);
        }

        let migrator = Arc::new(RecordMigrator {
            engine: Arc::clone(&self.engine),
            retry: RetryConfig::migration(options.max_retries as usize, config.retry_base_delay()),
            skip_threshold: config.skip_quality_threshold,
            dry_run: options.dry_run,
            target: target_backend,
        });
        let concurrency = options.concurrency.min(options.batch_size);
        let pause = config.batch_pause();

        let mut written: Vec<RecordKey> = Vec::new();
        let mut assessed: BTreeMap<RecordKey, DataQualityReport> = BTreeMap::new();
        let mut first_batch = true;

        'types: for content_type in types {
            let mut offset = 0u64;
            loop {
                if *cancel.borrow() {
                    report.cancelled = true;
                    break 'types;
                }

                let page = match source.list(content_type, offset, options.batch_size).await {
                    Ok(page) => page,
                    Err(e) => {
                        return Err(self.abort(
                            report,
                            format!("listing {} on {} at offset {}: {}", content_type, source_backend, offset, e),
                            "rerun after the source recovers; completed records are skipped by idempotent upsert",
                            start,
                        ))
                    }
                };
                if page.is_empty() {
                    break;
                }

                if !first_batch && !pause.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        _ = cancelled(&mut cancel) => {}
                    }
                    if *cancel.borrow() {
                        report.cancelled = true;
                        break 'types;
                    }
                }
                first_batch = false;

                let size = page.len();
                offset += size as u64;
                let batch_start = Instant::now();

                for outcome in Self::run_batch(&migrator, page, concurrency).await {
                    report.processed += 1;
                    match outcome.state {
                        RecordState::Succeeded => {
                            report.succeeded += 1;
                            crate::metrics::record_migration_record("succeeded");
                            if options.dry_run {
                                if let Some(q) = outcome.quality {
                                    assessed.insert(outcome.key, q);
                                }
                            } else {
                                written.push(outcome.key);
                            }
                        }
                        RecordState::Skipped => {
                            report.skipped += 1;
                            crate::metrics::record_migration_record("skipped");
                        }
                        _ => {
                            report.failed += 1;
                            crate::metrics::record_migration_record("failed");
                        }
                    }
                    if let Some(error) = outcome.error {
                        report.errors.push(error);
                    }
                }

                crate::metrics::record_migration_batch(size, batch_start.elapsed());
                debug!(
                    content_type = %content_type,
                    batch = size,
                    processed = report.processed,
                    total = report.total_records,
                    "Batch complete"
                );
                if size < options.batch_size {
                    break;
                }
            }
        }

        report.quality_report = if options.dry_run {
            let keys: Vec<RecordKey> = assessed.keys().cloned().collect();
            let sample = sample_evenly(&keys, config.quality_sample_size)
                .into_iter()
                .filter_map(|k| assessed.remove(&k).map(|q| (k.to_string(), q)))
                .collect::<Vec<_>>();
            if sample.is_empty() {
                DataQualityReport::clean()
            } else {
                DataQualityReport::aggregate(sample, config.consistency_threshold)
            }
        } else {
            let sample = sample_evenly(&written, config.quality_sample_size);
            if sample.is_empty() {
                DataQualityReport::clean()
            } else {
                self.engine.evaluator().evaluate_many(&sample).await
            }
        };

        if report.processed > report.total_records {
            warn!(
                processed = report.processed,
                counted = report.total_records,
                "Source grew during the run"
            );
            report.total_records = report.processed;
        }
        report.execution_time_ms = start.elapsed().as_millis() as u64;

        let status = if report.cancelled {
            "cancelled"
        } else if report.failed > 0 {
            "partial"
        } else {
            "completed"
        };
        crate::metrics::record_migration_run(status);
        info!(
            status,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            score = report.quality_report.score,
            time_ms = report.execution_time_ms,
            "Migration finished"
        );

        report
            .validate()
            .map_err(|e| MigrationError::Validation(format!("report failed its own contract: {}", e)))?;
        Ok(report)
    }

    async fn run_batch(migrator: &Arc<RecordMigrator>, page: Vec<ContentRecord>, concurrency: usize) -> Vec<RecordOutcome> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut outcomes = Vec::with_capacity(page.len());

        for record in page {
            let key = record.key();
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let migrator = Arc::clone(migrator);
            tasks.spawn(async move {
                let _permit = permit;
                migrator.migrate(record).await
            });
            debug!(key = %key, "Record queued");
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(error = %e, "Record task did not complete"),
            }
        }

        outcomes.sort_by(|a, b| a.key.cmp(&b.key));
        outcomes
    }

    fn abort(
        &self,
        mut report: MigrationReport,
        message: String,
        suggested_action: impl Into<String>,
        start: Instant,
    ) -> MigrationError {
        let error = MigrationRecordError::system(message, suggested_action);
        error!(error = %error.error, "Migration aborted");
        report.errors.push(error.clone());
        report.execution_time_ms = start.elapsed().as_millis() as u64;
        crate::metrics::record_migration_run("aborted");
        MigrationError::System { error, report: Box::new(report) }
    }
}
