// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage backends.
//!
//! - [`sql::SqlStore`]: backend A, a relational store over `sqlx`
//! - [`table::TableStore`]: backend B, a per-table REST API over `reqwest`
//! - [`memory::MemoryStore`]: in-process store for tests and local runs
//!
//! All of them implement [`traits::ContentStore`].

pub mod traits;
pub mod memory;
pub mod sql;
pub mod table;

use serde::{Deserialize, Serialize};

pub use traits::{ContentStore, StorageError};

/// Which of the two redundant backends an operation targets.
///
/// Writes always visit `A` then `B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// Relational store
    #[serde(rename = "backendA")]
    A,
    /// Backend-as-a-service table API
    #[serde(rename = "backendB")]
    B,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::A, Backend::B];

    /// The other backend.
    #[must_use]
    pub fn other(self) -> Backend {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Short label used for metrics.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "backendA"),
            Self::B => write!(f, "backendB"),
        }
    }
}
