//! Contracts for results and reports handed back to callers.

use super::{check_percent, ensure, Validate, ValidationError};
use crate::consistency::DataQualityReport;
use crate::coordinator::{BackendOutcome, Consistency, DualStorageResult};
use crate::migration::{MigrationReport, RollbackPlan};

fn check_outcome(outcome: &BackendOutcome, path: &str) -> Result<(), ValidationError> {
    ensure(
        outcome.attempted || !outcome.success,
        &format!("{}.success", path),
        "a backend that was not attempted cannot succeed",
    )?;
    ensure(
        outcome.success || outcome.error.is_some(),
        &format!("{}.error", path),
        "an unsuccessful backend must carry an error",
    )
}

impl Validate for DualStorageResult {
    fn validate(&self) -> Result<(), ValidationError> {
        ensure(!self.id.is_empty(), "id", "must not be empty")?;
        check_outcome(&self.backend_a, "backend_a")?;
        check_outcome(&self.backend_b, "backend_b")?;

        let expected = Consistency::from_outcomes(self.backend_a.success, self.backend_b.success);
        ensure(
            self.consistency == expected,
            "consistency",
            format!("is '{}' but backend outcomes imply '{}'", self.consistency, expected),
        )?;
        ensure(
            self.success == (self.backend_a.success || self.backend_b.success),
            "success",
            "must be true iff at least one backend succeeded",
        )
    }
}

impl Validate for DataQualityReport {
    fn validate(&self) -> Result<(), ValidationError> {
        check_percent(self.score, "score")?;
        check_percent(self.metrics.consistency, "metrics.consistency")?;
        check_percent(self.metrics.completeness, "metrics.completeness")?;
        check_percent(self.metrics.accuracy, "metrics.accuracy")?;
        check_percent(self.metrics.timeliness, "metrics.timeliness")?;
        for (i, v) in self.violations.iter().enumerate() {
            ensure(!v.field.is_empty(), &format!("violations[{}].field", i), "must not be empty")?;
            ensure(!v.issue.is_empty(), &format!("violations[{}].issue", i), "must not be empty")?;
        }
        ensure(
            self.score < 100 || self.violations.is_empty(),
            "score",
            "a perfect score cannot carry violations",
        )
    }
}

impl Validate for RollbackPlan {
    fn validate(&self) -> Result<(), ValidationError> {
        ensure(!self.backup_identifier.is_empty(), "backup_identifier", "must not be empty")?;
        ensure(!self.rollback_steps.is_empty(), "rollback_steps", "must contain at least one step")?;
        ensure(
            !self.verification_steps.is_empty(),
            "verification_steps",
            "must contain at least one step",
        )
    }
}

impl Validate for MigrationReport {
    fn validate(&self) -> Result<(), ValidationError> {
        ensure(
            self.processed == self.succeeded + self.failed + self.skipped,
            "processed",
            format!(
                "{} != succeeded {} + failed {} + skipped {}",
                self.processed, self.succeeded, self.failed, self.skipped
            ),
        )?;
        ensure(
            self.processed <= self.total_records || self.total_records == 0,
            "processed",
            format!("{} exceeds total_records {}", self.processed, self.total_records),
        )?;
        ensure(
            self.errors.len() as u64 >= self.failed + self.skipped,
            "errors",
            "every failed or skipped record must carry an error entry",
        )?;
        self.quality_report.validate()?;
        if let Some(ref plan) = self.rollback_plan {
            plan.validate()?;
        }
        Ok(())
    }
}
