// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-backend health gate.
//!
//! A consecutive-failure breaker with a cool-down, one per backend:
//!
//! - **Healthy**: fewer than `failure_threshold` failures since the last success
//! - **Unhealthy**: threshold reached and the last failure is younger than `cool_down`
//!
//! There is no half-open trial state. Once the cool-down elapses with no new
//! failure the counter resets to 0 the next time anyone looks at it, and the
//! next write is attempted normally.
//!
//! ## Metrics
//!
//! - `content_sync_backend_healthy{backend}`: gauge, 1 healthy / 0 unhealthy
//! - `content_sync_health_trips_total{backend}`: counter

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::record::now_millis;
use crate::storage::Backend;

#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Failures that mark a backend unhealthy
    pub failure_threshold: u32,
    /// How long an unhealthy backend stays gated after its last failure
    pub cool_down: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(60),
        }
    }
}

/// Point-in-time view of one backend's health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageHealth {
    pub failures: u32,
    /// Epoch millis of the most recent failure
    pub last_failure_at: Option<i64>,
    pub is_healthy: bool,
}

impl StorageHealth {
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            failures: 0,
            last_failure_at: None,
            is_healthy: true,
        }
    }
}

#[derive(Debug, Default)]
struct Counter {
    failures: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<i64>,
}

impl Counter {
    fn expired(&self, cool_down: Duration) -> bool {
        self.last_failure.is_some_and(|t| t.elapsed() >= cool_down)
    }

    fn healthy(&self, config: &HealthConfig) -> bool {
        self.failures < config.failure_threshold || self.expired(config.cool_down)
    }

    /// Apply the lazy cool-down reset.
    fn settle(&mut self, config: &HealthConfig) {
        if self.failures > 0 && self.expired(config.cool_down) {
            self.failures = 0;
            self.last_failure = None;
            self.last_failure_at = None;
        }
    }

    fn snapshot(&self, config: &HealthConfig) -> StorageHealth {
        StorageHealth {
            failures: self.failures,
            last_failure_at: self.last_failure_at,
            is_healthy: self.healthy(config),
        }
    }
}

/// Health counters for both backends.
///
/// These counters are the only shared mutable state in the engine; every
/// access goes through a short `parking_lot` critical section.
pub struct HealthTracker {
    config: HealthConfig,
    backend_a: Mutex<Counter>,
    backend_b: Mutex<Counter>,
}

impl HealthTracker {
    pub fn new(config: HealthConfig) -> Self {
        for backend in Backend::ALL {
            crate::metrics::set_backend_health(backend, true);
        }
        Self {
            config,
            backend_a: Mutex::new(Counter::default()),
            backend_b: Mutex::new(Counter::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    fn counter(&self, backend: Backend) -> &Mutex<Counter> {
        match backend {
            Backend::A => &self.backend_a,
            Backend::B => &self.backend_b,
        }
    }

    /// Record the outcome of one attempt and return the resulting health.
    pub fn record_outcome(&self, backend: Backend, success: bool) -> StorageHealth {
        let mut counter = self.counter(backend).lock();
        counter.settle(&self.config);

        if success {
            if counter.failures > 0 && !counter.healthy(&self.config) {
                info!(backend = %backend, "Backend recovered");
            }
            counter.failures = 0;
        } else {
            counter.failures = counter.failures.saturating_add(1);
            counter.last_failure = Some(Instant::now());
            counter.last_failure_at = Some(now_millis());
            if counter.failures == self.config.failure_threshold {
                warn!(
                    backend = %backend,
                    failures = counter.failures,
                    cool_down_ms = self.config.cool_down.as_millis() as u64,
                    "Backend marked unhealthy"
                );
                crate::metrics::record_health_trip(backend);
            }
        }

        let snapshot = counter.snapshot(&self.config);
        crate::metrics::set_backend_health(backend, snapshot.is_healthy);
        snapshot
    }

    /// Whether a write to `backend` should be attempted.
    #[must_use]
    pub fn is_healthy(&self, backend: Backend) -> bool {
        let mut counter = self.counter(backend).lock();
        counter.settle(&self.config);
        counter.healthy(&self.config)
    }

    /// Clear all failure history for a backend.
    pub fn reset(&self, backend: Backend) {
        *self.counter(backend).lock() = Counter::default();
        crate::metrics::set_backend_health(backend, true);
        info!(backend = %backend, "Backend health reset");
    }

    #[must_use]
    pub fn snapshot(&self, backend: Backend) -> StorageHealth {
        let mut counter = self.counter(backend).lock();
        counter.settle(&self.config);
        counter.snapshot(&self.config)
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tracker(threshold: u32, cool_down_ms: u64) -> HealthTracker {
        HealthTracker::new(HealthConfig {
            failure_threshold: threshold,
            cool_down: Duration::from_millis(cool_down_ms),
        })
    }

    #[test]
    fn test_new_tracker_is_healthy() {
        let t = HealthTracker::default();
        assert!(t.is_healthy(Backend::A));
        assert_eq!(t.snapshot(Backend::B), StorageHealth::healthy());
    }

    #[tokio::test]
    async fn test_threshold_trips() {
        let t = tracker(5, 60_000);
        for _ in 0..4 {
            t.record_outcome(Backend::B, false);
        }
        assert!(t.is_healthy(Backend::B));

        let health = t.record_outcome(Backend::B, false);
        assert!(!health.is_healthy);
        assert_eq!(health.failures, 5);
        assert!(health.last_failure_at.is_some());
        assert!(!t.is_healthy(Backend::B));
        assert!(t.is_healthy(Backend::A));
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let t = tracker(3, 60_000);
        t.record_outcome(Backend::A, false);
        t.record_outcome(Backend::A, false);
        let health = t.record_outcome(Backend::A, true);
        assert_eq!(health.failures, 0);

        t.record_outcome(Backend::A, false);
        t.record_outcome(Backend::A, false);
        assert!(t.is_healthy(Backend::A));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cool_down_restores_health() {
        let t = tracker(2, 1_000);
        t.record_outcome(Backend::A, false);
        t.record_outcome(Backend::A, false);
        assert!(!t.is_healthy(Backend::A));

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!t.is_healthy(Backend::A));

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(t.is_healthy(Backend::A));
        assert_eq!(t.snapshot(Backend::A).failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_cool_down_starts_fresh() {
        let t = tracker(2, 1_000);
        t.record_outcome(Backend::B, false);
        tokio::time::advance(Duration::from_secs(2)).await;

        let health = t.record_outcome(Backend::B, false);
        assert_eq!(health.failures, 1);
        assert!(health.is_healthy);
    }

    #[tokio::test]
    async fn test_reset() {
        let t = tracker(1, 60_000);
        t.record_outcome(Backend::A, false);
        assert!(!t.is_healthy(Backend::A));
        t.reset(Backend::A);
        assert!(t.is_healthy(Backend::A));
        assert_eq!(t.snapshot(Backend::A), StorageHealth::healthy());
    }

    #[tokio::test]
    async fn test_concurrent_failures_are_all_counted() {
        let t = Arc::new(tracker(1_000, 60_000));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let t = t.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    t.record_outcome(Backend::B, false);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(t.snapshot(Backend::B).failures, 200);
    }
}
