//! Integration Tests for Content Sync
//!
//! Real backend A (SQLite through `SqlStore`, one temp database per test) and
//! a mocked backend B table API (`wiremock`). No external services required.
//!
//! # Running Tests
//! ```bash
//! cargo test --test integration
//!
//! # Run only happy-path tests
//! cargo test --test integration happy
//!
//! # Run only failure scenario tests
//! cargo test --test integration failure
//! ```
//!
//! # Test Organization
//! - `happy_*` - Normal operation: writes, table API protocol, migration, rollback
//! - `failure_*` - Failure scenarios: table API errors

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use content_sync::migration::{restore_backup, IntegrityChecker, MigrationOptions, MigrationService, RollbackPlan};
use content_sync::storage::memory::MemoryStore;
use content_sync::storage::sql::SqlStore;
use content_sync::storage::table::TableStore;
use content_sync::{
    Backend, Consistency, ContentRecord, ContentStore, ContentType, Payload, PromptPayload, RecordKey, StorageError,
    StoryPayload, SyncConfig, SyncEngine,
};

// =============================================================================
// Helpers
// =============================================================================

async fn sqlite_store() -> (SqlStore, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("backend_a.db").display());
    (SqlStore::new(&url).await.unwrap(), dir)
}

fn story(id: &str) -> ContentRecord {
    ContentRecord::new(
        id,
        format!("Story {}", id),
        Payload::Story(StoryPayload {
            content: "She opened the door and the sea came in.".into(),
            genre: Some("fable".into()),
            tags: vec!["sea".into(), "door".into()],
            ..Default::default()
        }),
    )
    .with_owner("user-1")
}

/// Schema-valid draft that fails the quality pre-check.
fn low_quality(id: &str) -> ContentRecord {
    ContentRecord::new(id, "Untitled draft", Payload::Story(StoryPayload { word_count: Some(3), ..Default::default() }))
}

fn prompt(id: &str) -> ContentRecord {
    ContentRecord::new(
        id,
        "Portrait",
        Payload::Prompt(PromptPayload { text: "An oil portrait of a lighthouse keeper".into(), ..Default::default() }),
    )
    .with_owner("user-1")
}

/// JSON row as the table API stores it.
fn row(record: &ContentRecord) -> serde_json::Value {
    json!({
        "id": record.id,
        "title": record.title,
        "owner_id": record.owner_id,
        "status": record.status,
        "payload": record.payload,
        "created_at": record.created_at,
        "updated_at": record.updated_at,
    })
}

/// Answers an upsert with the rows it was sent, as `return=representation` does.
struct EchoRows;

impl Respond for EchoRows {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(201).set_body_raw(request.body.clone(), "application/json")
    }
}

fn table_store(server: &MockServer) -> TableStore {
    TableStore::new(&server.uri(), Some("secret".into()), Duration::from_secs(5)).unwrap()
}

fn migration_config(dir: &TempDir) -> SyncConfig {
    SyncConfig {
        backup_dir: dir.path().join("backups"),
        batch_pause_ms: 0,
        retry_base_delay_ms: 1,
        ..Default::default()
    }
}

// =============================================================================
// Happy Path - Backend A (SQLite)
// =============================================================================

#[tokio::test]
async fn happy_sql_dual_write_then_status() {
    let (sql, _dir) = sqlite_store().await;
    let a = Arc::new(sql);
    let b = Arc::new(MemoryStore::new());
    let engine = SyncEngine::new(SyncConfig::default(), a.clone(), Some(b.clone()));

    let record = story("s1");
    let result = engine.write(&record).await.unwrap();
    assert_eq!(result.consistency, Consistency::Full);

    assert_eq!(a.get(&record.key()).await.unwrap(), Some(record.clone()));
    let status = engine.sync_status(&record.key()).await;
    assert!(status.is_synced());
    assert_eq!(status.quality.score, 100);
}

#[tokio::test]
async fn happy_sql_archive_is_a_status_change() {
    let (sql, _dir) = sqlite_store().await;
    let engine = SyncEngine::new(SyncConfig::default(), Arc::new(sql), Some(Arc::new(MemoryStore::new())));

    let mut record = story("s1");
    engine.write(&record).await.unwrap();
    record.archive();
    engine.write(&record).await.unwrap();

    let stored = engine.store(content_sync::Backend::A).unwrap().get(&record.key()).await.unwrap().unwrap();
    assert_eq!(stored.status, content_sync::ContentStatus::Archived);
    assert_eq!(engine.store(content_sync::Backend::A).unwrap().count(ContentType::Story).await.unwrap(), 1);
}

// =============================================================================
// Happy Path - Backend B (table API)
// =============================================================================

#[tokio::test]
async fn happy_table_get_decodes_row() {
    let server = MockServer::start().await;
    let record = story("s1");
    Mock::given(method("GET"))
        .and(path("/rest/v1/stories"))
        .and(query_param("id", "eq.s1"))
        .and(header("apikey", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(&record)])))
        .expect(1)
        .mount(&server)
        .await;

    let fetched = table_store(&server).get(&record.key()).await.unwrap();
    assert_eq!(fetched, Some(record));
}

#[tokio::test]
async fn happy_table_missing_row_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/prompts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let fetched = table_store(&server).get(&RecordKey::new(ContentType::Prompt, "p404")).await.unwrap();
    assert!(fetched.is_none());
}

#[tokio::test]
async fn happy_table_upsert_merges_duplicates() {
    let server = MockServer::start().await;
    let record = prompt("p1");
    Mock::given(method("POST"))
        .and(path("/rest/v1/prompts"))
        .and(query_param("on_conflict", "id"))
        .and(header_regex("Prefer", "resolution=merge-duplicates"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(EchoRows)
        .expect(1)
        .mount(&server)
        .await;

    let stored = table_store(&server).upsert(&record).await.unwrap();
    assert_eq!(stored, record);
}

#[tokio::test]
async fn happy_table_count_reads_content_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/video_jobs"))
        .and(header("Prefer", "count=exact"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])).insert_header("Content-Range", "0-0/42"))
        .mount(&server)
        .await;

    assert_eq!(table_store(&server).count(ContentType::VideoJob).await.unwrap(), 42);
}

#[tokio::test]
async fn happy_connect_from_config_uses_table_override() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/legacy_stories"))
        .respond_with(EchoRows)
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let raw = format!(
        r#"
sql_url = "sqlite://{}?mode=rwc"
table_api_url = "{}"
write_timeout_ms = 5000

[table_names]
story = "legacy_stories"
"#,
        dir.path().join("a.db").display(),
        server.uri()
    );
    let config = SyncConfig::from_toml_str(&raw).unwrap();
    let engine = SyncEngine::connect(config).await.unwrap();

    let result = engine.write(&story("s1")).await.unwrap();
    assert_eq!(result.consistency, Consistency::Full);
}

// =============================================================================
// Failure Scenarios - table API
// =============================================================================

#[tokio::test]
async fn failure_table_503_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/stories"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream restarting"))
        .mount(&server)
        .await;

    let err = table_store(&server).upsert(&story("s1")).await.unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(ref m) if m.contains("upstream restarting")));
}

#[tokio::test]
async fn failure_table_rate_limit_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/stories"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = table_store(&server).upsert(&story("s1")).await.unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(ref m) if m.contains("slow down")));
}

#[tokio::test]
async fn failure_table_rejects_row_of_wrong_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/stories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(&prompt("s1"))])))
        .mount(&server)
        .await;

    let err = table_store(&server).get(&RecordKey::new(ContentType::Story, "s1")).await.unwrap_err();
    assert!(matches!(err, StorageError::Serialization(_)));
}

#[tokio::test]
async fn failure_table_errors_are_partial_writes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let (sql, _dir) = sqlite_store().await;
    let engine = SyncEngine::new(SyncConfig::default(), Arc::new(sql), Some(Arc::new(table_store(&server))));

    let result = engine.write(&story("s1")).await.unwrap();
    assert!(result.success);
    assert_eq!(result.consistency, Consistency::Partial);
    assert!(result.backend_b.error.as_deref().unwrap().contains("boom"));
}

// =============================================================================
// Happy Path - Migration
// =============================================================================

#[tokio::test]
async fn happy_migration_skips_low_quality_records() {
    let (sql, dir) = sqlite_store().await;
    let mut seed: Vec<ContentRecord> = (0..8).map(|i| story(&format!("s{}", i))).collect();
    seed.push(low_quality("s8"));
    seed.push(low_quality("s9"));
    sql.upsert_batch(&seed).await.unwrap();

    let b = Arc::new(MemoryStore::new());
    let engine = Arc::new(SyncEngine::new(migration_config(&dir), Arc::new(sql), Some(b.clone())));

    let options = MigrationOptions { batch_size: 4, ..Default::default() };
    let report = MigrationService::new(Arc::clone(&engine)).run_migration(options).await.unwrap();

    assert_eq!(report.total_records, 10);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.succeeded, 8);
    assert_eq!(report.failed, 0);
    assert_eq!(b.len(), 8);
    let skipped: Vec<&str> = report.errors.iter().map(|e| e.record_id.as_str()).collect();
    assert_eq!(skipped, vec!["story:s8", "story:s9"]);
    assert!(report.quality_report.is_consistent);

    let integrity = IntegrityChecker::new(engine).verify().await.unwrap();
    assert!(!integrity.is_valid);
    assert_eq!(integrity.orphaned.len(), 2);
    assert_eq!(integrity.orphaned[0].key, RecordKey::new(ContentType::Story, "s8"));
}

#[tokio::test]
async fn happy_migration_is_idempotent() {
    let (sql, dir) = sqlite_store().await;
    sql.upsert_batch(&[story("s1"), story("s2"), prompt("p1")]).await.unwrap();
    let b = Arc::new(MemoryStore::new());
    let service = MigrationService::new(Arc::new(SyncEngine::new(migration_config(&dir), Arc::new(sql), Some(b.clone()))));

    let first = service.run_migration(MigrationOptions::default()).await.unwrap();
    let before: Vec<_> = ["s1", "s2"].iter().map(|id| b.peek(&RecordKey::new(ContentType::Story, *id))).collect();
    let second = service.run_migration(MigrationOptions::default()).await.unwrap();
    let after: Vec<_> = ["s1", "s2"].iter().map(|id| b.peek(&RecordKey::new(ContentType::Story, *id))).collect();

    assert_eq!(first.succeeded, 3);
    assert_eq!(second.succeeded, 3);
    assert_eq!((first.failed, second.failed), (0, 0));
    assert_eq!(before, after);
    assert_eq!(b.len(), 3);
}

#[tokio::test]
async fn happy_migration_into_table_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/stories"))
        .respond_with(EchoRows)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = MemoryStore::with_records((0..3).map(|i| story(&format!("s{}", i))));
    let engine = SyncEngine::new(migration_config(&dir), Arc::new(source), Some(Arc::new(table_store(&server))));

    let options = MigrationOptions { create_backup: false, ..Default::default() };
    let report = MigrationService::new(Arc::new(engine)).run_migration(options).await.unwrap();
    assert_eq!(report.succeeded, 3);

    let posted = server.received_requests().await.unwrap();
    assert_eq!(posted.iter().filter(|r| r.method.as_str() == "POST").count(), 3);
}

#[tokio::test]
async fn happy_backup_and_rollback_round_trip() {
    let (sql, dir) = sqlite_store().await;
    sql.upsert_batch(&[story("s1"), story("s2")]).await.unwrap();

    let mut stale = story("s1");
    stale.title = "Before migration".into();
    let b = Arc::new(MemoryStore::with_records(vec![stale.clone(), prompt("p9")]));
    let config = migration_config(&dir);
    let backup_dir = config.backup_dir.clone();
    let engine = Arc::new(SyncEngine::new(config, Arc::new(sql), Some(b.clone())));

    let report = MigrationService::new(Arc::clone(&engine))
        .run_migration(MigrationOptions::default())
        .await
        .unwrap();
    assert_eq!(b.peek(&stale.key()).unwrap().title, "Story s1");

    let plan = report.rollback_plan.expect("backup requested");
    let plan_path = backup_dir.join(format!("{}.plan.json", plan.backup_identifier));
    let loaded = RollbackPlan::load(&plan_path).await.unwrap();
    assert_eq!(loaded, plan);

    // Two records from each side's snapshot.
    let summary = restore_backup(&loaded, &engine).await.unwrap();
    assert_eq!(loaded.backends(), vec![Backend::A, Backend::B]);
    assert_eq!(summary.restored, 4);
    assert_eq!(summary.verified, 4);
    assert_eq!(b.peek(&stale.key()).unwrap().title, "Before migration");
    assert!(b.peek(&prompt("p9").key()).is_some());
}
