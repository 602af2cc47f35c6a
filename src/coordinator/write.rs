// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Dual-storage write.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, instrument, warn};

use super::types::{BackendOutcome, Consistency, DegradationMode, DualStorageResult};
use super::SyncEngine;
use crate::metrics::LatencyTimer;
use crate::record::ContentRecord;
use crate::schema::{Validate, ValidationError};
use crate::storage::{Backend, ContentStore, StorageError};

/// One backend's part of a write.
struct Attempt {
    outcome: BackendOutcome,
    /// The failure recorded by this attempt closed the health gate
    tripped: bool,
}

impl Attempt {
    fn skipped(reason: impl Into<String>) -> Self {
        Self { outcome: BackendOutcome::skipped(reason), tripped: false }
    }
}

fn gate_closed(backend: Backend) -> String {
    StorageError::Unavailable(format!("{} health gate closed after repeated failures", backend)).to_string()
}

impl SyncEngine {
    /// Write one record to both backends, A then B.
    ///
    /// Only invalid input is an `Err`; nothing is written in that case.
    /// Backend failures are reported in the returned [`DualStorageResult`].
    /// There is no compensating rollback when only one backend succeeds.
    #[instrument(skip_all, fields(key = %record.key()))]
    pub async fn write(&self, record: &ContentRecord) -> Result<DualStorageResult, ValidationError> {
        let start = Instant::now();

        if let Err(e) = record.validate() {
            warn!(error = %e, "Rejected invalid record");
            crate::metrics::record_validation_rejection(record.content_type.as_str());
            return Err(e);
        }

        let a_gated = !self.health.is_healthy(Backend::A);
        let a = if a_gated {
            crate::metrics::record_backend_write(Backend::A, "skipped");
            Attempt::skipped(gate_closed(Backend::A))
        } else {
            self.attempt(Backend::A, &self.store_a, record).await
        };

        let b = match self.store_b {
            None => Attempt::skipped("backendB disabled by configuration"),
            Some(ref store_b) if self.health.is_healthy(Backend::B) => {
                self.attempt(Backend::B, store_b, record).await
            }
            Some(_) => {
                crate::metrics::record_backend_write(Backend::B, "skipped");
                Attempt::skipped(gate_closed(Backend::B))
            }
        };

        let degradation_mode = if a_gated {
            DegradationMode::BackendACircuitOpen
        } else if !b.outcome.attempted {
            DegradationMode::BackendBDisabled
        } else if a.tripped {
            DegradationMode::BackendACircuitOpen
        } else if b.tripped {
            DegradationMode::BackendBCircuitOpen
        } else {
            DegradationMode::None
        };

        let consistency = Consistency::from_outcomes(a.outcome.success, b.outcome.success);
        let result = DualStorageResult {
            id: record.id.clone(),
            success: a.outcome.success || b.outcome.success,
            backend_a: a.outcome,
            backend_b: b.outcome,
            consistency,
            degradation_mode,
            total_time_ms: start.elapsed().as_millis() as u64,
        };

        if let Err(e) = result.validate() {
            error!(error = %e, "Write result violates its contract");
            return Err(e);
        }

        crate::metrics::record_dual_write(consistency, degradation_mode);
        match consistency {
            Consistency::Full => debug!(time_ms = result.total_time_ms, "Write fully replicated"),
            Consistency::Partial => warn!(
                degradation = %degradation_mode,
                errors = %result.error_summary().unwrap_or_default(),
                "Partial write"
            ),
            Consistency::Failed => error!(
                errors = %result.error_summary().unwrap_or_default(),
                "Write failed on both backends"
            ),
        }
        Ok(result)
    }

    async fn attempt(&self, backend: Backend, store: &Arc<dyn ContentStore>, record: &ContentRecord) -> Attempt {
        let timer = LatencyTimer::new(backend.label(), "write");
        let timeout = self.config.write_timeout();
        let result = tokio::time::timeout(timeout, store.upsert(record)).await;
        let timing_ms = timer.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(Ok(_)) => {
                crate::metrics::record_backend_write(backend, "success");
                BackendOutcome::succeeded(timing_ms)
            }
            Ok(Err(e)) => {
                warn!(backend = %backend, error = %e, kind = e.kind(), "Backend write failed");
                crate::metrics::record_backend_write(backend, "error");
                BackendOutcome::failed(e.to_string(), timing_ms)
            }
            Err(_) => {
                let e = StorageError::Timeout(timeout);
                warn!(backend = %backend, error = %e, "Backend write timed out");
                crate::metrics::record_backend_write(backend, "timeout");
                BackendOutcome::failed(e.to_string(), timing_ms)
            }
        };

        let health = self.health.record_outcome(backend, outcome.success);
        Attempt {
            tripped: !outcome.success && !health.is_healthy,
            outcome,
        }
    }
}
