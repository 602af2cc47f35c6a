//! Property-based tests (fuzzing) for content-sync.
//!
//! Uses proptest to generate random/malformed inputs and verify that scoring
//! is deterministic and monotone, that write results keep their consistency
//! invariant, and that decoding never panics, only returns clean errors.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::BTreeMap;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::Value;

use content_sync::consistency::compare::{compare_records, normalize_text};
use content_sync::consistency::report::score;
use content_sync::consistency::QualityDimension;
use content_sync::schema::Validate;
use content_sync::{
    Backend, BackendOutcome, Consistency, ContentRecord, ContentStatus, DataQualityReport, DegradationMode,
    DualStorageResult, HealthConfig, HealthTracker, Payload, PromptPayload, ScenarioPayload, Severity, StoryPayload,
    Violation, VideoJobPayload,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

fn severity_strategy() -> impl Strategy<Value = Severity> {
    prop_oneof![Just(Severity::Critical), Just(Severity::Warning), Just(Severity::Info)]
}

fn violation_strategy() -> impl Strategy<Value = Violation> {
    ("[a-z_.]{1,20}", severity_strategy())
        .prop_map(|(field, severity)| Violation::new(field, "generated", severity, QualityDimension::Consistency))
}

fn status_strategy() -> impl Strategy<Value = ContentStatus> {
    prop_oneof![
        Just(ContentStatus::Draft),
        Just(ContentStatus::Processing),
        Just(ContentStatus::Completed),
        Just(ContentStatus::Failed),
        Just(ContentStatus::Archived),
    ]
}

fn payload_strategy() -> impl Strategy<Value = Payload> {
    prop_oneof![
        (".{0,200}", prop::option::of("[a-z]{1,10}"), prop::collection::vec("[a-z]{1,8}", 0..5)).prop_map(
            |(content, genre, tags)| Payload::Story(StoryPayload { content, genre, word_count: None, tags })
        ),
        (".{0,200}", prop::collection::vec("[A-Z][a-z]{1,8}", 0..5)).prop_map(|(description, characters)| {
            Payload::Scenario(ScenarioPayload { description, characters, ..Default::default() })
        }),
        (".{0,200}", prop::collection::btree_map("[a-z]{1,6}", "[a-z]{0,6}", 0..4), any::<u32>()).prop_map(
            |(text, variables, usage_count)| {
                Payload::Prompt(PromptPayload { text, model: None, variables, usage_count })
            }
        ),
        ("[a-z]{0,12}", 0u8..=100, prop::option::of("https://cdn\\.example\\.com/[a-z]{1,8}\\.mp4")).prop_map(
            |(provider, progress, output_url)| {
                Payload::VideoJob(VideoJobPayload { provider, progress, output_url, ..Default::default() })
            }
        ),
    ]
}

/// Records with arbitrary text; many are schema-invalid.
fn record_strategy() -> impl Strategy<Value = ContentRecord> {
    (
        "[a-zA-Z0-9_-]{0,40}",
        ".{0,80}",
        prop::option::of("[a-z0-9]{0,12}"),
        status_strategy(),
        payload_strategy(),
        1i64..4_000_000_000_000,
        0i64..10_000_000,
    )
        .prop_map(|(id, title, owner, status, payload, created_at, delta)| {
            let mut record = ContentRecord::new(id, title, payload).with_status(status);
            record.owner_id = owner;
            record.created_at = created_at;
            record.updated_at = created_at + delta;
            record
        })
}

/// Generate arbitrary JSON values (including invalid structures)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        4,  // depth
        64, // max nodes
        10, // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
                prop::collection::hash_map(".*", inner, 0..10)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

fn outcome_strategy() -> impl Strategy<Value = BackendOutcome> {
    prop_oneof![
        (0u64..10_000).prop_map(BackendOutcome::succeeded),
        ("[a-z ]{1,30}", 0u64..10_000).prop_map(|(e, t)| BackendOutcome::failed(e, t)),
        "[a-z ]{1,30}".prop_map(BackendOutcome::skipped),
    ]
}

// =============================================================================
// Deserialization Fuzz Tests
// =============================================================================

proptest! {
    /// ContentRecord deserialization should never panic on arbitrary bytes
    #[test]
    fn fuzz_record_from_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..10000)) {
        let result: Result<ContentRecord, _> = serde_json::from_slice(&bytes);
        let _ = result;
    }

    /// ContentRecord deserialization should handle arbitrary JSON gracefully
    #[test]
    fn fuzz_record_from_arbitrary_json(json in arbitrary_json_strategy()) {
        let serialized = serde_json::to_vec(&json).unwrap();
        let result: Result<ContentRecord, _> = serde_json::from_slice(&serialized);
        let _ = result;
    }

    /// Corrupted serialized records should fail gracefully, and anything that
    /// still decodes must survive validation without panicking
    #[test]
    fn fuzz_corrupted_record(
        record in record_strategy(),
        corruption in prop::collection::vec(any::<u8>(), 1..50),
        position in 0usize..10000,
    ) {
        let mut corrupted = serde_json::to_vec(&record).unwrap();
        let pos = position % corrupted.len();
        for (i, b) in corruption.iter().enumerate() {
            let idx = (pos + i) % corrupted.len();
            corrupted[idx] ^= b;
        }

        if let Ok(decoded) = serde_json::from_slice::<ContentRecord>(&corrupted) {
            let _ = decoded.validate();
        }
    }

    /// Reports coming back from a backend or a plan file must decode or fail cleanly
    #[test]
    fn fuzz_report_from_arbitrary_json(json in arbitrary_json_strategy()) {
        let _ = serde_json::from_value::<DataQualityReport>(json.clone());
        let _ = serde_json::from_value::<DualStorageResult>(json);
    }
}

// =============================================================================
// Scoring Properties
// =============================================================================

proptest! {
    /// Score follows the penalty formula exactly
    #[test]
    fn prop_score_formula(violations in prop::collection::vec(violation_strategy(), 0..20)) {
        let count = |s: Severity| violations.iter().filter(|v| v.severity == s).count() as i64;
        let expected = (100 - 30 * count(Severity::Critical) - 10 * count(Severity::Warning) - 2 * count(Severity::Info)).max(0);
        prop_assert_eq!(i64::from(score(&violations)), expected);
    }

    /// Same violations, same score, regardless of order
    #[test]
    fn prop_score_deterministic(violations in prop::collection::vec(violation_strategy(), 0..20)) {
        let mut reversed = violations.clone();
        reversed.reverse();
        prop_assert_eq!(score(&violations), score(&violations));
        prop_assert_eq!(score(&violations), score(&reversed));
    }

    /// Adding a violation never raises the score
    #[test]
    fn prop_score_monotone(
        violations in prop::collection::vec(violation_strategy(), 0..20),
        extra in violation_strategy(),
    ) {
        let before = score(&violations);
        let mut more = violations.clone();
        more.push(extra);
        prop_assert!(score(&more) <= before);
    }

    /// is_consistent is exactly score >= threshold
    #[test]
    fn prop_report_threshold(
        violations in prop::collection::vec(violation_strategy(), 0..10),
        threshold in 0u8..=100,
    ) {
        let report = DataQualityReport::from_violations(violations, threshold);
        prop_assert_eq!(report.is_consistent, report.score >= threshold);
        prop_assert!(report.validate().is_ok());
    }

    /// A record compared with itself has no findings
    #[test]
    fn prop_self_comparison_is_clean(record in record_strategy()) {
        let violations = compare_records(&record, &record, 5_000);
        prop_assert!(violations.is_empty(), "unexpected: {:?}", violations);
    }

    /// Comparison is symmetric in the number and severity of findings
    #[test]
    fn prop_comparison_symmetric_score(a in record_strategy(), b in record_strategy()) {
        let ab = score(&compare_records(&a, &b, 5_000));
        let ba = score(&compare_records(&b, &a, 5_000));
        prop_assert_eq!(ab, ba);
    }

    /// Normalization is idempotent
    #[test]
    fn prop_normalize_idempotent(text in ".{0,200}") {
        let once = normalize_text(&text);
        prop_assert_eq!(normalize_text(&once), once);
    }
}

// =============================================================================
// Write Result Invariant Tests
// =============================================================================

proptest! {
    /// full iff both succeeded, partial iff exactly one, failed iff neither
    #[test]
    fn prop_consistency_invariant(a in any::<bool>(), b in any::<bool>()) {
        let expected = match (a, b) {
            (true, true) => Consistency::Full,
            (false, false) => Consistency::Failed,
            _ => Consistency::Partial,
        };
        prop_assert_eq!(Consistency::from_outcomes(a, b), expected);
    }

    /// Results assembled the way the writer does always pass their own contract
    #[test]
    fn prop_assembled_result_validates(a in outcome_strategy(), b in outcome_strategy()) {
        let result = DualStorageResult {
            id: "s1".into(),
            success: a.success || b.success,
            consistency: Consistency::from_outcomes(a.success, b.success),
            backend_a: a,
            backend_b: b,
            degradation_mode: DegradationMode::None,
            total_time_ms: 0,
        };
        prop_assert!(result.validate().is_ok());
    }
}

// =============================================================================
// Health Tracker Properties
// =============================================================================

proptest! {
    /// Healthy iff the trailing run of failures is shorter than the threshold
    #[test]
    fn prop_health_tracks_trailing_failures(
        outcomes in prop::collection::vec(any::<bool>(), 0..50),
        threshold in 1u32..10,
    ) {
        let tracker = HealthTracker::new(HealthConfig { failure_threshold: threshold, cool_down: Duration::from_secs(3600) });
        for success in &outcomes {
            tracker.record_outcome(Backend::B, *success);
        }

        let trailing = outcomes.iter().rev().take_while(|s| !**s).count() as u32;
        prop_assert_eq!(tracker.snapshot(Backend::B).failures, trailing);
        prop_assert_eq!(tracker.is_healthy(Backend::B), trailing < threshold);
        prop_assert!(tracker.is_healthy(Backend::A));
    }
}

// =============================================================================
// Edge Case Tests
// =============================================================================

proptest! {
    /// Validation never panics, whatever the record holds
    #[test]
    fn prop_validation_never_panics(record in record_strategy()) {
        let _ = record.validate();
    }

    /// Unusual variable maps survive a serialization round trip
    #[test]
    fn prop_prompt_variables_preserved(variables in prop::collection::btree_map(".{0,10}", ".{0,10}", 0..8)) {
        let record = ContentRecord::new(
            "p1",
            "Prompt",
            Payload::Prompt(PromptPayload { text: "t".into(), variables: variables.clone(), ..Default::default() }),
        );
        let decoded: ContentRecord = serde_json::from_slice(&serde_json::to_vec(&record).unwrap()).unwrap();
        match decoded.payload {
            Payload::Prompt(p) => prop_assert_eq!(p.variables, variables),
            _ => prop_assert!(false, "payload type changed"),
        }
    }

    /// Content hashes ignore everything outside the payload
    #[test]
    fn prop_content_hash_ignores_title(record in record_strategy(), title in ".{0,40}") {
        let mut renamed = record.clone();
        renamed.title = title;
        prop_assert_eq!(record.content_hash(), renamed.content_hash());
    }
}

#[test]
fn empty_variable_map_is_default() {
    let p = PromptPayload::default();
    assert_eq!(p.variables, BTreeMap::new());
}
