//! Backend health gating and retry policies.

pub mod health;
pub mod retry;

pub use health::{HealthConfig, HealthTracker, StorageHealth};
pub use retry::{retry, retry_if, Backoff, RetryConfig};
