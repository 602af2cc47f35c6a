// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential or linear backoff.
//!
//! Different presets are available for different use cases.
//!
//! # Example
//!
//! ```
//! use content_sync::RetryConfig;
//! use std::time::Duration;
//!
//! // Startup: fail fast on bad config
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_retries, Some(5));
//!
//! // Query: quick retry, then fail
//! let query = RetryConfig::query();
//! assert_eq!(query.max_retries, Some(3));
//!
//! // Migration writes: base_delay * attempt
//! let writes = RetryConfig::migration(3, Duration::from_millis(1000));
//! assert_eq!(writes.delay_for(2), Duration::from_millis(2000));
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `initial_delay * factor^(attempt-1)`
    Exponential { factor: f64 },
    /// `initial_delay * attempt`
    Linear,
}

/// Configuration for connection/operation retry behavior.
///
/// Use the preset constructors for common patterns:
/// - [`RetryConfig::startup()`] - Fast-fail for initial connections
/// - [`RetryConfig::query()`] - Quick retry for individual reads
/// - [`RetryConfig::migration()`] - Linear backoff for migration writes
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
    /// Total attempts, including the first. `None` retries forever.
    pub max_retries: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::query()
    }
}

impl RetryConfig {
    /// Fast-fail retry for initial startup connection.
    /// Attempts 5 times with exponential backoff, failing after ~5 seconds.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_retries: Some(5),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            backoff: Backoff::Exponential { factor: 2.0 },
        }
    }

    /// Quick retry for individual queries (don't block forever).
    #[must_use]
    pub fn query() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            backoff: Backoff::Exponential { factor: 2.0 },
        }
    }

    /// Per-record write retry during migration: up to `attempts` tries,
    /// waiting `base_delay * attempt` in between.
    #[must_use]
    pub fn migration(attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_retries: Some(attempts.max(1)),
            initial_delay: base_delay,
            max_delay: base_delay.saturating_mul(attempts.max(1) as u32),
            backoff: Backoff::Linear,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff: Backoff::Exponential { factor: 2.0 },
        }
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.backoff {
            Backoff::Exponential { factor } => {
                let mut d = self.initial_delay;
                for _ in 1..attempt {
                    d = d.mul_f64(factor);
                    if d >= self.max_delay {
                        break;
                    }
                }
                d
            }
            Backoff::Linear => self.initial_delay.saturating_mul(attempt as u32),
        };
        delay.min(self.max_delay)
    }
}

/// Retry `operation` until it succeeds or the attempt budget runs out.
pub async fn retry<F, Fut, T, E>(operation_name: &str, config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_if(operation_name, config, operation, |_| true).await
}

/// Like [`retry`], but gives up at once when `should_retry` rejects an error.
///
/// The budget is checked before the predicate, so the last error returned is
/// always the one from the final attempt made.
pub async fn retry_if<F, Fut, T, E, P>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
    mut should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: FnMut(&E) -> bool,
{
    let mut failures = 0usize;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if failures > 0 {
                    info!(operation = operation_name, failures, "Recovered after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        failures += 1;
        let exhausted = config.max_retries.is_some_and(|max| failures >= max);
        if exhausted || !should_retry(&err) {
            return Err(err);
        }

        let delay = config.delay_for(failures);
        warn!(
            operation = operation_name,
            attempt = failures,
            max_attempts = ?config.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Attempt failed; retrying"
        );
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct Flaky(&'static str);

    /// Fails `failures` times, then yields the attempt number.
    fn flaky(failures: usize, calls: Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<Result<usize, Flaky>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if n <= failures { Err(Flaky("transient")) } else { Ok(n) })
        }
    }

    #[tokio::test]
    async fn first_success_needs_no_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let out = retry("op", &RetryConfig::test(), flaky(0, calls.clone())).await;
        assert_eq!(out.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_errors_are_absorbed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let out = retry("op", &RetryConfig::test(), flaky(2, calls.clone())).await;
        assert_eq!(out.unwrap(), 3);
    }

    #[tokio::test]
    async fn budget_counts_every_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let out = retry("op", &RetryConfig::test(), flaky(usize::MAX, calls.clone())).await;
        assert_eq!(out.unwrap_err().0, "transient");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rejected_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let out = retry_if("op", &RetryConfig::test(), flaky(usize::MAX, calls.clone()), |_| false).await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn migration_preset_waits_linearly() {
        let config = RetryConfig::migration(3, Duration::from_millis(1000));
        let calls = Arc::new(AtomicUsize::new(0));
        let start = tokio::time::Instant::now();

        let out = retry("op", &config, flaky(usize::MAX, calls)).await;

        assert!(out.is_err());
        // 1s after the first failure, 2s after the second, nothing after the last
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[test]
    fn presets() {
        assert_eq!(RetryConfig::startup().max_retries, Some(5));
        assert_eq!(RetryConfig::query().max_retries, Some(3));
        assert_eq!(RetryConfig::migration(0, Duration::from_millis(5)).max_retries, Some(1));
    }

    #[test]
    fn exponential_delays_double_and_cap() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            backoff: Backoff::Exponential { factor: 2.0 },
            max_retries: Some(5),
        };
        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(300));
        assert_eq!(config.delay_for(40), Duration::from_millis(300));
    }

    #[test]
    fn linear_delays_scale_with_attempt() {
        let config = RetryConfig::migration(4, Duration::from_millis(250));
        assert_eq!(config.delay_for(1), Duration::from_millis(250));
        assert_eq!(config.delay_for(3), Duration::from_millis(750));
        assert_eq!(config.delay_for(9), Duration::from_millis(1000));
    }
}
