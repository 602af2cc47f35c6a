//! Per-record sync status.

use tracing::instrument;

use super::types::SyncStatus;
use super::SyncEngine;
use crate::record::RecordKey;
use crate::storage::Backend;

impl SyncEngine {
    /// Presence on each backend, both health snapshots and a fresh
    /// consistency evaluation for one record. Each backend is read once.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn sync_status(&self, key: &RecordKey) -> SyncStatus {
        let evaluation = self.evaluator.evaluate_fetched(key).await;

        SyncStatus {
            key: key.clone(),
            in_backend_a: evaluation.in_backend_a,
            in_backend_b: evaluation.in_backend_b,
            health_a: self.health.snapshot(Backend::A),
            health_b: self.health.snapshot(Backend::B),
            quality: evaluation.report,
        }
    }
}
