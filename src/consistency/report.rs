//! Data quality report and scoring.
//!
//! Scoring is additive and bounded: start at 100, subtract a fixed penalty per
//! violation by severity, floor at 0. The same violation set always yields the
//! same score.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Penalty for a critical violation.
pub const CRITICAL_PENALTY: u32 = 30;
/// Penalty for a warning.
pub const WARNING_PENALTY: u32 = 10;
/// Penalty for an informational finding.
pub const INFO_PENALTY: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Structurally different core fields, missing record, failed fetch
    Critical,
    /// Derived or denormalized field drift
    Warning,
    /// Cosmetic differences
    Info,
}

impl Severity {
    #[must_use]
    pub fn penalty(&self) -> u32 {
        match self {
            Self::Critical => CRITICAL_PENALTY,
            Self::Warning => WARNING_PENALTY,
            Self::Info => INFO_PENALTY,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// Which quality metric a violation counts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityDimension {
    Consistency,
    Completeness,
    Accuracy,
    Timeliness,
}

/// One finding from a comparison or quality check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub issue: String,
    pub severity: Severity,
    pub dimension: QualityDimension,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_a: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_b: Option<Value>,
}

impl Violation {
    pub fn new(
        field: impl Into<String>,
        issue: impl Into<String>,
        severity: Severity,
        dimension: QualityDimension,
    ) -> Self {
        Self {
            field: field.into(),
            issue: issue.into(),
            severity,
            dimension,
            value_a: None,
            value_b: None,
        }
    }

    #[must_use]
    pub fn with_values(mut self, a: impl Serialize, b: impl Serialize) -> Self {
        self.value_a = serde_json::to_value(a).ok();
        self.value_b = serde_json::to_value(b).ok();
        self
    }
}

/// Per-dimension sub-scores, each 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub consistency: u8,
    pub completeness: u8,
    pub accuracy: u8,
    pub timeliness: u8,
}

impl QualityMetrics {
    pub const PERFECT: QualityMetrics = QualityMetrics {
        consistency: 100,
        completeness: 100,
        accuracy: 100,
        timeliness: 100,
    };

    /// Derive each sub-score from the violations filed under that dimension.
    #[must_use]
    pub fn from_violations(violations: &[Violation]) -> Self {
        let dim = |d: QualityDimension| {
            let filtered: Vec<&Violation> = violations.iter().filter(|v| v.dimension == d).collect();
            score_iter(filtered.into_iter())
        };
        Self {
            consistency: dim(QualityDimension::Consistency),
            completeness: dim(QualityDimension::Completeness),
            accuracy: dim(QualityDimension::Accuracy),
            timeliness: dim(QualityDimension::Timeliness),
        }
    }
}

fn score_iter<'a>(violations: impl Iterator<Item = &'a Violation>) -> u8 {
    let penalty: u32 = violations.map(|v| v.severity.penalty()).sum();
    100u32.saturating_sub(penalty) as u8
}

/// Score a violation set: 100 minus penalties, floored at 0.
#[must_use]
pub fn score(violations: &[Violation]) -> u8 {
    score_iter(violations.iter())
}

/// Diagnostic comparison result. Never persisted as a backend record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub is_consistent: bool,
    pub score: u8,
    pub violations: Vec<Violation>,
    pub metrics: QualityMetrics,
}

impl DataQualityReport {
    /// Build a report from violations using the given pass threshold.
    #[must_use]
    pub fn from_violations(violations: Vec<Violation>, threshold: u8) -> Self {
        let score = score(&violations);
        Self {
            is_consistent: score >= threshold,
            score,
            metrics: QualityMetrics::from_violations(&violations),
            violations,
        }
    }

    /// A report with no findings.
    #[must_use]
    pub fn clean() -> Self {
        Self {
            is_consistent: true,
            score: 100,
            violations: Vec::new(),
            metrics: QualityMetrics::PERFECT,
        }
    }

    /// Combine per-record reports: scores and metrics are averaged (floored), and each
    /// violation's field is prefixed with its record label.
    #[must_use]
    pub fn aggregate(reports: Vec<(String, DataQualityReport)>, threshold: u8) -> Self {
        if reports.is_empty() {
            return Self::clean();
        }
        let n = reports.len() as u64;
        let mut totals = [0u64; 5];
        let mut violations = Vec::new();

        for (label, report) in reports {
            totals[0] += u64::from(report.score);
            totals[1] += u64::from(report.metrics.consistency);
            totals[2] += u64::from(report.metrics.completeness);
            totals[3] += u64::from(report.metrics.accuracy);
            totals[4] += u64::from(report.metrics.timeliness);
            violations.extend(report.violations.into_iter().map(|mut v| {
                v.field = format!("{}.{}", label, v.field);
                v
            }));
        }

        // Floor so that any imperfect member keeps the aggregate below 100.
        let avg = |t: u64| (t / n) as u8;
        let score = avg(totals[0]);
        Self {
            is_consistent: score >= threshold,
            score,
            violations,
            metrics: QualityMetrics {
                consistency: avg(totals[1]),
                completeness: avg(totals[2]),
                accuracy: avg(totals[3]),
                timeliness: avg(totals[4]),
            },
        }
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.violations.iter().filter(|v| v.severity == severity).count()
    }
}
