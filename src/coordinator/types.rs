//! Public types for the dual-storage writer.

use serde::{Deserialize, Serialize};

use crate::consistency::DataQualityReport;
use crate::record::RecordKey;
use crate::resilience::health::StorageHealth;
use crate::storage::Backend;

/// Cross-backend consistency of a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    /// Both backends accepted the write
    Full,
    /// Exactly one backend accepted the write
    Partial,
    /// Neither backend accepted the write
    Failed,
}

impl Consistency {
    #[must_use]
    pub fn from_outcomes(a_success: bool, b_success: bool) -> Self {
        match (a_success, b_success) {
            (true, true) => Self::Full,
            (false, false) => Self::Failed,
            _ => Self::Partial,
        }
    }
}

impl std::fmt::Display for Consistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Which degradation, if any, shaped a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradationMode {
    #[serde(rename = "none")]
    None,
    /// Backend B was skipped: health gate closed or disabled by configuration
    #[serde(rename = "backendB-disabled")]
    BackendBDisabled,
    /// Backend A was skipped by its health gate, or tripped it during this write
    #[serde(rename = "backendA-circuit-open")]
    BackendACircuitOpen,
    /// Backend B tripped its health gate during this write
    #[serde(rename = "backendB-circuit-open")]
    BackendBCircuitOpen,
}

impl std::fmt::Display for DegradationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::BackendBDisabled => write!(f, "backendB-disabled"),
            Self::BackendACircuitOpen => write!(f, "backendA-circuit-open"),
            Self::BackendBCircuitOpen => write!(f, "backendB-circuit-open"),
        }
    }
}

/// Outcome of one backend's part of a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendOutcome {
    pub attempted: bool,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timing_ms: u64,
}

impl BackendOutcome {
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self { attempted: false, success: false, error: Some(reason.into()), timing_ms: 0 }
    }

    #[must_use]
    pub fn succeeded(timing_ms: u64) -> Self {
        Self { attempted: true, success: true, error: None, timing_ms }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>, timing_ms: u64) -> Self {
        Self { attempted: true, success: false, error: Some(error.into()), timing_ms }
    }
}

/// What a caller needs from a write before treating it as done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyRequirement {
    /// Critical creates: both backends must hold the record
    Full,
    /// Background resyncs: one backend is enough
    AtLeastOne,
}

/// Result of one logical write across both backends.
///
/// Backend failures never surface as `Err`; they are captured here and the
/// caller decides whether a `partial` outcome is acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualStorageResult {
    pub id: String,
    /// True when at least one backend holds the write
    pub success: bool,
    pub backend_a: BackendOutcome,
    pub backend_b: BackendOutcome,
    pub consistency: Consistency,
    pub degradation_mode: DegradationMode,
    pub total_time_ms: u64,
}

impl DualStorageResult {
    #[must_use]
    pub fn outcome(&self, backend: Backend) -> &BackendOutcome {
        match backend {
            Backend::A => &self.backend_a,
            Backend::B => &self.backend_b,
        }
    }

    #[must_use]
    pub fn meets(&self, requirement: ConsistencyRequirement) -> bool {
        match requirement {
            ConsistencyRequirement::Full => self.consistency == Consistency::Full,
            ConsistencyRequirement::AtLeastOne => self.success,
        }
    }

    /// Joined error text from both backends, if any.
    #[must_use]
    pub fn error_summary(&self) -> Option<String> {
        let parts: Vec<String> = [Backend::A, Backend::B]
            .into_iter()
            .filter_map(|b| self.outcome(b).error.as_ref().map(|e| format!("{}: {}", b, e)))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

/// Sync status of a single record across both backends.
///
/// `None` presence means the backend could not be queried.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub key: RecordKey,
    pub in_backend_a: Option<bool>,
    pub in_backend_b: Option<bool>,
    pub health_a: StorageHealth,
    pub health_b: StorageHealth,
    pub quality: DataQualityReport,
}

impl SyncStatus {
    /// Present on both sides and consistent.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.in_backend_a == Some(true) && self.in_backend_b == Some(true) && self.quality.is_consistent
    }
}
