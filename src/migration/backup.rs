// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pre-migration snapshots and rollback plans.
//!
//! A snapshot is a JSON-lines file, one [`ContentRecord`] per line, written
//! page by page from one backend. A migration snapshots both backends, since
//! the dual writer rewrites the source as well as the target. Each file's
//! SHA-256 goes into the [`RollbackPlan`] so a tampered or truncated file is
//! refused at restore time.
//!
//! Plans are never executed automatically. `content-sync rollback <plan>
//! --execute` (or [`restore_backup`]) replays them; every step is an upsert
//! or a read, so replaying a plan twice is harmless.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{info, warn};

use super::MigrationError;
use crate::coordinator::SyncEngine;
use crate::record::{now_millis, ContentRecord, ContentType};
use crate::storage::{Backend, ContentStore};

/// Records upserted per restore round-trip.
const RESTORE_CHUNK: usize = 100;
/// Rough per-record restore cost used for plan estimates.
const RESTORE_MS_PER_RECORD: u64 = 10;
/// Fixed overhead for checksum and integrity steps.
const RESTORE_BASE_MS: u64 = 1_000;

/// What a finished snapshot contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub backup_identifier: String,
    pub backend: Backend,
    pub path: PathBuf,
    pub records: u64,
    pub bytes: u64,
    /// Hex SHA-256 of the file contents
    pub sha256: String,
    pub created_at: i64,
}

/// Writes backend snapshots into a directory.
pub struct BackupWriter {
    dir: PathBuf,
    page_size: usize,
}

impl BackupWriter {
    pub fn new(dir: impl Into<PathBuf>, page_size: usize) -> Self {
        Self {
            dir: dir.into(),
            page_size: page_size.max(1),
        }
    }

    /// Snapshot every record on `store` to `<dir>/<identifier>.<backend>.jsonl`.
    pub async fn snapshot(
        &self,
        store: &dyn ContentStore,
        backend: Backend,
        identifier: &str,
    ) -> Result<BackupManifest, MigrationError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.{}.jsonl", identifier, backend));
        let mut writer = BufWriter::new(File::create(&path).await?);
        let mut hasher = Sha256::new();
        let mut records = 0u64;
        let mut bytes = 0u64;

        for content_type in ContentType::ALL {
            let mut offset = 0u64;
            loop {
                let page = store
                    .list(content_type, offset, self.page_size)
                    .await
                    .map_err(|e| MigrationError::Backup(format!("reading {} from {}: {}", content_type, backend, e)))?;
                if page.is_empty() {
                    break;
                }
                for record in &page {
                    let mut line = serde_json::to_vec(record)
                        .map_err(|e| MigrationError::Backup(format!("encoding {}: {}", record.key(), e)))?;
                    line.push(b'\n');
                    hasher.update(&line);
                    writer.write_all(&line).await?;
                    bytes += line.len() as u64;
                    records += 1;
                }
                offset += page.len() as u64;
                if page.len() < self.page_size {
                    break;
                }
            }
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;

        let manifest = BackupManifest {
            backup_identifier: identifier.to_string(),
            backend,
            path,
            records,
            bytes,
            sha256: hex::encode(hasher.finalize()),
            created_at: now_millis(),
        };
        crate::metrics::record_backup(records, bytes);
        info!(
            backup = %manifest.backup_identifier,
            backend = %backend,
            records,
            path = %manifest.path.display(),
            "Backup snapshot written"
        );
        Ok(manifest)
    }
}

/// One idempotent rollback action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RollbackStep {
    /// Refuse to continue unless the snapshot still hashes to `sha256`
    VerifyBackupChecksum { backend: Backend, path: PathBuf, sha256: String },
    /// Upsert every snapshot record back into `backend`
    RestoreRecords { backend: Backend, path: PathBuf, records: u64 },
    /// Every snapshot record must be readable from `backend` again
    VerifyIntegrity { backend: Backend, expected_records: u64 },
}

impl RollbackStep {
    #[must_use]
    pub fn backend(&self) -> Backend {
        match self {
            Self::VerifyBackupChecksum { backend, .. }
            | Self::RestoreRecords { backend, .. }
            | Self::VerifyIntegrity { backend, .. } => *backend,
        }
    }
}

/// How to undo a migration. Built before the first write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPlan {
    pub backup_identifier: String,
    pub rollback_steps: Vec<RollbackStep>,
    pub verification_steps: Vec<String>,
    pub estimated_time_ms: u64,
}

impl RollbackPlan {
    /// One checksum, restore and verify triple per snapshot, in snapshot order.
    #[must_use]
    pub fn build(backup_identifier: impl Into<String>, manifests: &[BackupManifest]) -> Self {
        let mut rollback_steps = Vec::with_capacity(manifests.len() * 3);
        let mut verification_steps = Vec::with_capacity(manifests.len() * 2 + 1);
        let mut estimated_time_ms = 0;

        for manifest in manifests {
            let backend = manifest.backend;
            rollback_steps.push(RollbackStep::VerifyBackupChecksum {
                backend,
                path: manifest.path.clone(),
                sha256: manifest.sha256.clone(),
            });
            rollback_steps.push(RollbackStep::RestoreRecords {
                backend,
                path: manifest.path.clone(),
                records: manifest.records,
            });
            rollback_steps.push(RollbackStep::VerifyIntegrity {
                backend,
                expected_records: manifest.records,
            });
            verification_steps.push(format!("sha256 of {} equals {}", manifest.path.display(), manifest.sha256));
            verification_steps.push(format!("all {} snapshot records are readable from {}", manifest.records, backend));
            estimated_time_ms += RESTORE_BASE_MS + manifest.records * RESTORE_MS_PER_RECORD;
        }
        verification_steps.push("content-sync verify reports no orphaned or duplicate keys".to_string());

        Self {
            backup_identifier: backup_identifier.into(),
            rollback_steps,
            verification_steps,
            estimated_time_ms,
        }
    }

    /// Backends this plan restores into, in plan order.
    #[must_use]
    pub fn backends(&self) -> Vec<Backend> {
        let mut out: Vec<Backend> = Vec::with_capacity(2);
        for step in &self.rollback_steps {
            if let RollbackStep::RestoreRecords { backend, .. } = step {
                if !out.contains(backend) {
                    out.push(*backend);
                }
            }
        }
        out
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), MigrationError> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| MigrationError::Backup(e.to_string()))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, MigrationError> {
        let raw = tokio::fs::read(path).await?;
        serde_json::from_slice(&raw).map_err(|e| MigrationError::Backup(format!("invalid rollback plan: {}", e)))
    }
}

/// What a rollback did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub restored: u64,
    pub verified: u64,
}

async fn read_snapshot(path: &Path) -> Result<Vec<ContentRecord>, MigrationError> {
    let mut lines = BufReader::new(File::open(path).await?).lines();
    let mut records = Vec::new();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let record: ContentRecord = serde_json::from_str(&line)
            .map_err(|e| MigrationError::Backup(format!("{} line {}: {}", path.display(), line_no, e)))?;
        records.push(record);
    }
    Ok(records)
}

async fn file_sha256(path: &Path) -> Result<String, MigrationError> {
    let raw = tokio::fs::read(path).await?;
    Ok(hex::encode(Sha256::digest(&raw)))
}

/// Execute every step of `plan` on every backend it covers.
///
/// All checksums are verified before anything is written, so a damaged
/// snapshot for one backend leaves both untouched.
pub async fn restore_backup(plan: &RollbackPlan, engine: &SyncEngine) -> Result<RestoreSummary, MigrationError> {
    for step in &plan.rollback_steps {
        if let RollbackStep::VerifyBackupChecksum { path, sha256, .. } = step {
            verify_checksum(path, sha256).await?;
        }
    }

    let mut summary = RestoreSummary::default();
    for backend in plan.backends() {
        let store = engine
            .store(backend)
            .ok_or_else(|| MigrationError::Backup(format!("{} is not enabled in this configuration", backend)))?;
        let part = restore_into(plan, backend, store.as_ref()).await?;
        summary.restored += part.restored;
        summary.verified += part.verified;
    }
    Ok(summary)
}

async fn verify_checksum(path: &Path, sha256: &str) -> Result<(), MigrationError> {
    let actual = file_sha256(path).await?;
    if actual != sha256 {
        return Err(MigrationError::Backup(format!(
            "checksum mismatch for {}: expected {}, found {}",
            path.display(),
            sha256,
            actual
        )));
    }
    Ok(())
}

/// Execute the steps of `plan` that belong to `backend` against `store`.
pub async fn restore_into(
    plan: &RollbackPlan,
    backend: Backend,
    store: &dyn ContentStore,
) -> Result<RestoreSummary, MigrationError> {
    let mut summary = RestoreSummary::default();
    let mut restored: Vec<ContentRecord> = Vec::new();

    for step in plan.rollback_steps.iter().filter(|s| s.backend() == backend) {
        match step {
            RollbackStep::VerifyBackupChecksum { path, sha256, .. } => verify_checksum(path, sha256).await?,
            RollbackStep::RestoreRecords { path, records, .. } => {
                restored = read_snapshot(path).await?;
                if restored.len() as u64 != *records {
                    warn!(
                        backend = %backend,
                        expected = records,
                        found = restored.len(),
                        "Snapshot record count differs from plan"
                    );
                }
                for chunk in restored.chunks(RESTORE_CHUNK) {
                    store
                        .upsert_batch(chunk)
                        .await
                        .map_err(|e| MigrationError::Backup(format!("restoring into {}: {}", backend, e)))?;
                    summary.restored += chunk.len() as u64;
                }
                info!(backend = %backend, restored = summary.restored, "Snapshot restored");
            }
            RollbackStep::VerifyIntegrity { expected_records, .. } => {
                for record in &restored {
                    let found = store
                        .get(&record.key())
                        .await
                        .map_err(|e| MigrationError::Backup(format!("verifying {} on {}: {}", record.key(), backend, e)))?;
                    if found.is_none() {
                        return Err(MigrationError::Backup(format!(
                            "{} missing from {} after restore",
                            record.key(),
                            backend
                        )));
                    }
                    summary.verified += 1;
                }
                if summary.verified < *expected_records {
                    return Err(MigrationError::Backup(format!(
                        "verified {} of {} records on {}",
                        summary.verified, expected_records, backend
                    )));
                }
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::record::{Payload, PromptPayload, StoryPayload};
    use crate::schema::Validate;
    use crate::storage::memory::MemoryStore;
    use std::sync::Arc;

    fn records() -> Vec<ContentRecord> {
        let mut out: Vec<ContentRecord> = (0..5)
            .map(|i| {
                ContentRecord::new(
                    format!("s{}", i),
                    format!("Story {}", i),
                    Payload::Story(StoryPayload { content: "text".into(), ..Default::default() }),
                )
            })
            .collect();
        out.push(ContentRecord::new(
            "p1",
            "Prompt",
            Payload::Prompt(PromptPayload { text: "draw".into(), ..Default::default() }),
        ));
        out
    }

    async fn single_plan(dir: &Path, store: &MemoryStore, backend: Backend, id: &str) -> (BackupManifest, RollbackPlan) {
        let manifest = BackupWriter::new(dir, 50).snapshot(store, backend, id).await.unwrap();
        let plan = RollbackPlan::build(id, std::slice::from_ref(&manifest));
        (manifest, plan)
    }

    #[tokio::test]
    async fn test_snapshot_pages_through_every_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::with_records(records());
        let manifest = BackupWriter::new(dir.path(), 2)
            .snapshot(&store, Backend::B, "backup-a-to-b-1")
            .await
            .unwrap();

        assert_eq!(manifest.records, 6);
        assert!(manifest.path.ends_with("backup-a-to-b-1.backendB.jsonl"));
        assert_eq!(manifest.sha256, file_sha256(&manifest.path).await.unwrap());
        assert_eq!(read_snapshot(&manifest.path).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_plan_covers_each_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let a = MemoryStore::with_records(records());
        let b = MemoryStore::with_records(records().into_iter().take(2));
        let writer = BackupWriter::new(dir.path(), 50);
        let manifests = vec![
            writer.snapshot(&a, Backend::A, "backup-x").await.unwrap(),
            writer.snapshot(&b, Backend::B, "backup-x").await.unwrap(),
        ];
        let plan = RollbackPlan::build("backup-x", &manifests);

        assert!(plan.validate().is_ok());
        assert_eq!(plan.rollback_steps.len(), 6);
        assert_eq!(plan.backends(), vec![Backend::A, Backend::B]);
        assert!(matches!(
            plan.rollback_steps[3],
            RollbackStep::VerifyBackupChecksum { backend: Backend::B, .. }
        ));
        assert_eq!(plan.estimated_time_ms, (1_000 + 6 * 10) + (1_000 + 2 * 10));
        assert_eq!(plan.verification_steps.len(), 5);

        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["rollback_steps"][1]["action"], "restore_records");
        assert_eq!(json["rollback_steps"][1]["backend"], "backendA");
        assert_eq!(json["rollback_steps"][4]["backend"], "backendB");
    }

    #[tokio::test]
    async fn test_restore_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemoryStore::with_records(records());
        let (_, plan) = single_plan(dir.path(), &source, Backend::B, "backup-r").await;

        let target = MemoryStore::new();
        let first = restore_into(&plan, Backend::B, &target).await.unwrap();
        let second = restore_into(&plan, Backend::B, &target).await.unwrap();

        assert_eq!(first, RestoreSummary { restored: 6, verified: 6 });
        assert_eq!(first, second);
        assert_eq!(target.len(), 6);
    }

    #[tokio::test]
    async fn test_restore_into_ignores_other_backend_steps() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemoryStore::with_records(records());
        let (_, plan) = single_plan(dir.path(), &source, Backend::A, "backup-o").await;

        let other = MemoryStore::new();
        let summary = restore_into(&plan, Backend::B, &other).await.unwrap();
        assert_eq!(summary, RestoreSummary::default());
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_tampered_backup_refused() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemoryStore::with_records(records());
        let (manifest, plan) = single_plan(dir.path(), &source, Backend::A, "backup-t").await;
        tokio::fs::write(&manifest.path, b"{}\n").await.unwrap();

        let target = MemoryStore::new();
        let err = restore_into(&plan, Backend::A, &target).await.unwrap_err();
        assert!(matches!(err, MigrationError::Backup(ref m) if m.contains("checksum mismatch")));
        assert!(target.is_empty());
    }

    #[tokio::test]
    async fn test_damaged_snapshot_blocks_every_backend() {
        let dir = tempfile::tempdir().unwrap();
        let writer = BackupWriter::new(dir.path(), 50);
        let a_snapshot = writer
            .snapshot(&MemoryStore::with_records(records()), Backend::A, "backup-d")
            .await
            .unwrap();
        let b_snapshot = writer
            .snapshot(&MemoryStore::with_records(records()), Backend::B, "backup-d")
            .await
            .unwrap();
        let plan = RollbackPlan::build("backup-d", &[a_snapshot, b_snapshot.clone()]);
        tokio::fs::write(&b_snapshot.path, b"").await.unwrap();

        let a = Arc::new(MemoryStore::new());
        let b = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new(SyncConfig::default(), a.clone(), Some(b.clone()));

        assert!(restore_backup(&plan, &engine).await.is_err());
        assert!(a.is_empty());
        assert!(b.is_empty());
    }

    #[tokio::test]
    async fn test_plan_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::with_records(records());
        let (_, plan) = single_plan(dir.path(), &store, Backend::B, "backup-f").await;
        let plan_path = dir.path().join("plan.json");

        plan.save(&plan_path).await.unwrap();
        assert_eq!(RollbackPlan::load(&plan_path).await.unwrap(), plan);
    }
}
