//! Migration report types.

use serde::{Deserialize, Serialize};

use super::backup::RollbackPlan;
use crate::consistency::{DataQualityReport, Severity};

/// Record id used for errors that are not tied to one record.
pub const SYSTEM_SCOPE: &str = "SYSTEM";

/// Per-record state during a run.
///
/// `Pending → Validating → (Skipped | Writing) → (Succeeded | Failed)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    Pending,
    Validating,
    Skipped,
    Writing,
    Succeeded,
    Failed,
}

impl RecordState {
    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_transition_to(self, next: RecordState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Validating)
                | (Self::Validating, Self::Skipped)
                | (Self::Validating, Self::Writing)
                | (Self::Writing, Self::Succeeded)
                | (Self::Writing, Self::Failed)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Skipped | Self::Succeeded | Self::Failed)
    }
}

/// Structured per-record (or system-scoped) error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecordError {
    pub record_id: String,
    pub error: String,
    pub severity: Severity,
    pub recoverable: bool,
    pub suggested_action: String,
}

impl MigrationRecordError {
    pub fn new(
        record_id: impl Into<String>,
        error: impl Into<String>,
        severity: Severity,
        recoverable: bool,
        suggested_action: impl Into<String>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            error: error.into(),
            severity,
            recoverable,
            suggested_action: suggested_action.into(),
        }
    }

    /// A run-aborting error not tied to any record.
    pub fn system(error: impl Into<String>, suggested_action: impl Into<String>) -> Self {
        Self::new(SYSTEM_SCOPE, error, Severity::Critical, false, suggested_action)
    }
}

/// Aggregate outcome of a migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub total_records: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub errors: Vec<MigrationRecordError>,
    pub quality_report: DataQualityReport,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_plan: Option<RollbackPlan>,
    pub dry_run: bool,
    /// Stopped early by cooperative cancellation
    pub cancelled: bool,
}

impl MigrationReport {
    #[must_use]
    pub fn empty(total_records: u64, dry_run: bool) -> Self {
        Self {
            total_records,
            processed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            errors: Vec::new(),
            quality_report: DataQualityReport::clean(),
            execution_time_ms: 0,
            rollback_plan: None,
            dry_run,
            cancelled: false,
        }
    }

    /// Every record was migrated.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.succeeded >= self.total_records
    }
}
