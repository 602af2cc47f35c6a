// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cross-backend consistency evaluation and data quality scoring.
//!
//! ```text
//!   backend A ──get──┐
//!                    ├──► compare_records ──► violations ──► DataQualityReport
//!   backend B ──get──┘                                        score = 100 − 30·C − 10·W − 2·I
//! ```
//!
//! Fetch failures and missing records are findings, not errors: evaluation
//! always produces a report.

pub mod compare;
pub mod quality;
pub mod report;

pub use compare::normalize_text;
pub use report::{DataQualityReport, QualityDimension, QualityMetrics, Severity, Violation};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::record::{ContentRecord, RecordKey};
use crate::schema::Validate;
use crate::storage::{Backend, ContentStore, StorageError};

/// Compares both backends' views of records.
pub struct ConsistencyEvaluator {
    store_a: Arc<dyn ContentStore>,
    store_b: Option<Arc<dyn ContentStore>>,
    threshold: u8,
    tolerance: Duration,
}

impl ConsistencyEvaluator {
    /// `store_b = None` evaluates backend A alone.
    pub fn new(
        store_a: Arc<dyn ContentStore>,
        store_b: Option<Arc<dyn ContentStore>>,
        threshold: u8,
        tolerance: Duration,
    ) -> Self {
        Self { store_a, store_b, threshold, tolerance }
    }

    #[must_use]
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    fn tolerance_ms(&self) -> i64 {
        self.tolerance.as_millis() as i64
    }

    fn finish(&self, violations: Vec<Violation>) -> DataQualityReport {
        for severity in [Severity::Critical, Severity::Warning, Severity::Info] {
            crate::metrics::record_violations(severity, violations.iter().filter(|v| v.severity == severity).count());
        }
        let report = DataQualityReport::from_violations(violations, self.threshold);
        if let Err(e) = report.validate() {
            warn!(error = %e, "Quality report failed its own contract");
        }
        report
    }

    /// Compare two fetched views of the same record.
    #[must_use]
    pub fn compare(&self, a: &ContentRecord, b: &ContentRecord) -> DataQualityReport {
        self.finish(compare::compare_records(a, b, self.tolerance_ms()))
    }

    /// Single-record quality pre-check.
    #[must_use]
    pub fn assess(&self, record: &ContentRecord) -> DataQualityReport {
        self.finish(quality::assess_record(record, self.tolerance_ms()))
    }

    /// Fetch `key` from both backends and compare.
    pub async fn evaluate(&self, key: &RecordKey) -> DataQualityReport {
        self.evaluate_fetched(key).await.report
    }

    /// Like [`evaluate`](Self::evaluate), also reporting what each fetch found.
    /// Both backends are read concurrently.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn evaluate_fetched(&self, key: &RecordKey) -> Evaluation {
        let (a, b) = tokio::join!(self.store_a.get(key), async {
            match self.store_b {
                Some(ref store_b) => Some(store_b.get(key).await),
                None => None,
            }
        });
        let in_backend_a = found(&a);
        let in_backend_b = b.as_ref().and_then(found);

        let report = match b {
            Some(b) => self.compare_fetched(a, b),
            None => {
                let mut violations = Vec::new();
                presence(&mut violations, Backend::A, &a);
                violations.push(Violation::new(
                    "backendB",
                    "backend B disabled; cross-backend comparison skipped",
                    Severity::Info,
                    QualityDimension::Completeness,
                ));
                self.finish(violations)
            }
        };
        crate::metrics::set_quality_score("record", report.score);
        debug!(score = report.score, consistent = report.is_consistent, "Evaluated record");
        Evaluation { in_backend_a, in_backend_b, report }
    }

    fn compare_fetched(
        &self,
        a: Result<Option<ContentRecord>, StorageError>,
        b: Result<Option<ContentRecord>, StorageError>,
    ) -> DataQualityReport {
        match (&a, &b) {
            (Ok(Some(a)), Ok(Some(b))) => self.compare(a, b),
            _ => {
                let mut violations = Vec::new();
                presence(&mut violations, Backend::A, &a);
                presence(&mut violations, Backend::B, &b);
                self.finish(violations)
            }
        }
    }

    /// Evaluate several keys and aggregate. Violation fields are prefixed
    /// with the record key.
    pub async fn evaluate_many(&self, keys: &[RecordKey]) -> DataQualityReport {
        let mut reports = Vec::with_capacity(keys.len());
        for key in keys {
            reports.push((key.to_string(), self.evaluate(key).await));
        }
        let report = DataQualityReport::aggregate(reports, self.threshold);
        crate::metrics::set_quality_score("aggregate", report.score);
        report
    }
}

/// One record's evaluation plus what each backend returned for it.
/// Presence is `None` when the fetch failed or the backend is disabled.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub in_backend_a: Option<bool>,
    pub in_backend_b: Option<bool>,
    pub report: DataQualityReport,
}

fn found(fetched: &Result<Option<ContentRecord>, StorageError>) -> Option<bool> {
    fetched.as_ref().ok().map(Option::is_some)
}

fn presence(out: &mut Vec<Violation>, backend: Backend, fetched: &Result<Option<ContentRecord>, StorageError>) {
    match fetched {
        Ok(Some(_)) => {}
        Ok(None) => out.push(Violation::new(
            backend.to_string(),
            format!("record missing from {}", backend),
            Severity::Critical,
            QualityDimension::Completeness,
        )),
        Err(e) => out.push(Violation::new(
            backend.to_string(),
            format!("fetch from {} failed: {}", backend, e),
            Severity::Critical,
            QualityDimension::Completeness,
        )),
    }
}

/// Up to `n` keys spread evenly across `keys`, in order.
#[must_use]
pub fn sample_evenly(keys: &[RecordKey], n: usize) -> Vec<RecordKey> {
    if n == 0 {
        return Vec::new();
    }
    if keys.len() <= n {
        return keys.to_vec();
    }
    (0..n).map(|i| keys[i * keys.len() / n].clone()).collect()
}
