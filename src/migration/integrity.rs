// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Key-level integrity check across both backends.
//!
//! Enumerates every key on each enabled backend and reports:
//! - counts per backend and content type (enumerated vs. reported by `count`)
//! - orphans: keys present on one backend only
//! - duplicates: keys returned more than once while paging one backend
//!
//! Content is not compared here; that is the consistency evaluator's job.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::coordinator::SyncEngine;
use crate::record::{now_millis, ContentType, RecordKey};
use crate::storage::{Backend, ContentStore, StorageError};

/// Per-type counts for one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    pub content_type: ContentType,
    /// Distinct keys seen while paging
    pub enumerated: u64,
    /// What the backend's `count` returned
    pub reported: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendInventory {
    pub backend: Backend,
    pub counts: Vec<TypeCount>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanedKey {
    pub key: RecordKey,
    pub present_on: Backend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateKey {
    pub key: RecordKey,
    pub backend: Backend,
    pub occurrences: u32,
}

/// Outcome of [`IntegrityChecker::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub is_valid: bool,
    pub backends: Vec<BackendInventory>,
    pub orphaned: Vec<OrphanedKey>,
    pub duplicates: Vec<DuplicateKey>,
    pub checked_at: i64,
}

struct Scan {
    keys: BTreeSet<RecordKey>,
    duplicates: Vec<DuplicateKey>,
    inventory: BackendInventory,
}

/// Walks every enabled backend through the engine's stores.
pub struct IntegrityChecker {
    engine: Arc<SyncEngine>,
    page_size: usize,
}

impl IntegrityChecker {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        let page_size = engine.config().batch_size.max(1);
        Self { engine, page_size }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn verify(&self) -> Result<IntegrityReport, StorageError> {
        let mut scans = Vec::with_capacity(2);
        for backend in Backend::ALL {
            if let Some(store) = self.engine.store(backend) {
                scans.push(self.scan(backend, store.as_ref()).await?);
            }
        }

        let mut orphaned = Vec::new();
        if let [a, b] = scans.as_slice() {
            orphaned.extend(a.keys.difference(&b.keys).map(|key| OrphanedKey {
                key: key.clone(),
                present_on: a.inventory.backend,
            }));
            orphaned.extend(b.keys.difference(&a.keys).map(|key| OrphanedKey {
                key: key.clone(),
                present_on: b.inventory.backend,
            }));
        }

        let count_drift = scans
            .iter()
            .flat_map(|s| s.inventory.counts.iter())
            .any(|c| c.enumerated != c.reported);
        let duplicates: Vec<DuplicateKey> = scans.iter().flat_map(|s| s.duplicates.iter().cloned()).collect();

        let report = IntegrityReport {
            is_valid: orphaned.is_empty() && duplicates.is_empty() && !count_drift,
            backends: scans.into_iter().map(|s| s.inventory).collect(),
            orphaned,
            duplicates,
            checked_at: now_millis(),
        };

        if report.is_valid {
            info!(backends = report.backends.len(), "Integrity check passed");
        } else {
            warn!(
                orphaned = report.orphaned.len(),
                duplicates = report.duplicates.len(),
                count_drift,
                "Integrity check found problems"
            );
        }
        Ok(report)
    }

    async fn scan(&self, backend: Backend, store: &dyn ContentStore) -> Result<Scan, StorageError> {
        let mut seen: BTreeMap<RecordKey, u32> = BTreeMap::new();
        let mut counts = Vec::with_capacity(ContentType::ALL.len());

        for content_type in ContentType::ALL {
            let reported = store.count(content_type).await?;
            let before = seen.len();
            let mut offset = 0u64;
            loop {
                let page = store.list(content_type, offset, self.page_size).await?;
                if page.is_empty() {
                    break;
                }
                for record in &page {
                    *seen.entry(record.key()).or_insert(0) += 1;
                }
                offset += page.len() as u64;
                if page.len() < self.page_size {
                    break;
                }
            }
            counts.push(TypeCount {
                content_type,
                enumerated: (seen.len() - before) as u64,
                reported,
            });
        }

        let duplicates = seen
            .iter()
            .filter(|(_, n)| **n > 1)
            .map(|(key, n)| DuplicateKey { key: key.clone(), backend, occurrences: *n })
            .collect();
        let total = counts.iter().map(|c| c.enumerated).sum();

        Ok(Scan {
            keys: seen.into_keys().collect(),
            duplicates,
            inventory: BackendInventory { backend, counts, total },
        })
    }
}
