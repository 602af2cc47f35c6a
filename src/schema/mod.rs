// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Structural contracts for everything that crosses a store or component
//! boundary.
//!
//! Every [`ContentRecord`](crate::ContentRecord) is checked before any I/O,
//! and every [`DualStorageResult`](crate::DualStorageResult),
//! [`DataQualityReport`](crate::DataQualityReport) and
//! [`MigrationReport`](crate::MigrationReport) is checked before it is handed
//! to a caller. Failures carry a field path so the offending input can be
//! located without re-reading the record.
//!
//! # Example
//!
//! ```
//! use content_sync::{ContentRecord, Payload, StoryPayload};
//! use content_sync::schema::Validate;
//!
//! let record = ContentRecord::new("s1", "  ", Payload::Story(StoryPayload::default()));
//! let err = record.validate().unwrap_err();
//! assert_eq!(err.path, "title");
//! ```

mod record;
mod reports;

use thiserror::Error;

/// Maximum id length accepted by both backends.
pub const MAX_ID_LEN: usize = 255;
/// Maximum title length.
pub const MAX_TITLE_LEN: usize = 500;
/// Maximum primary body length (story content, prompt text, ...).
pub const MAX_BODY_LEN: usize = 1_000_000;

/// A structural contract violation at a specific field path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("validation failed at '{path}': {message}")]
pub struct ValidationError {
    /// Dotted field path, e.g. `payload.data.progress`
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

/// Structural validation.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Fail with `path`/`message` unless `cond` holds.
pub(crate) fn ensure(cond: bool, path: &str, message: impl Into<String>) -> Result<(), ValidationError> {
    if cond {
        Ok(())
    } else {
        Err(ValidationError::new(path, message))
    }
}

/// Ids travel in URLs and primary keys: no whitespace or control characters.
pub(crate) fn check_identifier(value: &str, path: &str) -> Result<(), ValidationError> {
    ensure(!value.is_empty(), path, "must not be empty")?;
    ensure(
        value.len() <= MAX_ID_LEN,
        path,
        format!("must be at most {} bytes", MAX_ID_LEN),
    )?;
    ensure(
        !value.chars().any(|c| c.is_whitespace() || c.is_control()),
        path,
        "must not contain whitespace or control characters",
    )
}

pub(crate) fn check_percent(value: u8, path: &str) -> Result<(), ValidationError> {
    ensure(value <= 100, path, format!("must be within 0-100, got {}", value))
}
