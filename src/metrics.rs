// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for content-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding service is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `content_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `backend`: a, b
//! - `operation`: write, get, list, count
//! - `status`: success, error, timeout, skipped

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

use crate::consistency::Severity;
use crate::coordinator::{Consistency, DegradationMode};
use crate::storage::Backend;

/// Record one backend's part of a write
pub fn record_backend_write(backend: Backend, status: &'static str) {
    counter!(
        "content_sync_backend_writes_total",
        "backend" => backend.label(),
        "status" => status
    )
    .increment(1);
}

/// Record backend operation latency
pub fn record_latency(backend: &'static str, operation: &'static str, duration: Duration) {
    histogram!(
        "content_sync_backend_operation_seconds",
        "backend" => backend,
        "operation" => operation
    )
    .record(duration.as_secs_f64());
}

/// Record the combined outcome of a dual write
pub fn record_dual_write(consistency: Consistency, degradation: DegradationMode) {
    counter!(
        "content_sync_writes_total",
        "consistency" => consistency.to_string(),
        "degradation" => degradation.to_string()
    )
    .increment(1);
}

/// Record a write rejected before any I/O
pub fn record_validation_rejection(content_type: &str) {
    counter!(
        "content_sync_validation_rejections_total",
        "content_type" => content_type.to_string()
    )
    .increment(1);
}

/// Set backend health (1 = healthy, 0 = gated)
pub fn set_backend_health(backend: Backend, healthy: bool) {
    gauge!(
        "content_sync_backend_healthy",
        "backend" => backend.label()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

/// Record a backend crossing its failure threshold
pub fn record_health_trip(backend: Backend) {
    counter!(
        "content_sync_health_trips_total",
        "backend" => backend.label()
    )
    .increment(1);
}

/// Record violations found by a consistency check
pub fn record_violations(severity: Severity, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        "content_sync_violations_total",
        "severity" => severity.to_string()
    )
    .increment(count as u64);
}

/// Set the latest quality score for a scope (`record`, `migration`)
pub fn set_quality_score(scope: &'static str, score: u8) {
    gauge!(
        "content_sync_quality_score",
        "scope" => scope
    )
    .set(f64::from(score));
}

/// Record one migrated record's terminal state
pub fn record_migration_record(outcome: &'static str) {
    counter!(
        "content_sync_migration_records_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a finished migration batch
pub fn record_migration_batch(size: usize, duration: Duration) {
    histogram!("content_sync_migration_batch_size").record(size as f64);
    histogram!("content_sync_migration_batch_seconds").record(duration.as_secs_f64());
}

/// Record a finished migration run
pub fn record_migration_run(status: &'static str) {
    counter!(
        "content_sync_migration_runs_total",
        "status" => status
    )
    .increment(1);
}

/// Record a written backup snapshot
pub fn record_backup(records: u64, bytes: u64) {
    counter!("content_sync_backup_records_total").increment(records);
    counter!("content_sync_backup_bytes_total").increment(bytes);
}

/// Timer guard that records latency on drop
pub struct LatencyTimer {
    backend: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(backend: &'static str, operation: &'static str) -> Self {
        Self {
            backend,
            operation,
            start: Instant::now(),
        }
    }

    /// Elapsed time so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.backend, self.operation, self.start.elapsed());
    }
}
