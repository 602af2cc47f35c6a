//! Field-by-field comparison of two views of the same record.
//!
//! Severity ladder:
//! - critical: identity and ownership fields (`type`, `title`, `status`,
//!   `owner_id`) and primary body text that differs after normalization
//! - warning: derived or denormalized fields, secondary attributes, and
//!   timestamps further apart than the tolerance
//! - info: whitespace-only and ordering-only differences

use std::collections::BTreeSet;

use serde::Serialize;

use super::report::{QualityDimension, Severity, Violation};
use crate::record::{ContentRecord, Payload, PromptPayload, ScenarioPayload, StoryPayload, VideoJobPayload};

/// Collapse whitespace runs to one space and trim.
#[must_use]
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compare two records that share a key.
#[must_use]
pub fn compare_records(a: &ContentRecord, b: &ContentRecord, tolerance_ms: i64) -> Vec<Violation> {
    let mut out = Vec::new();

    if a.content_type != b.content_type {
        out.push(
            Violation::new("type", "content type differs", Severity::Critical, QualityDimension::Consistency)
                .with_values(a.content_type, b.content_type),
        );
        // Payload shapes are incomparable across types.
        return out;
    }

    text(&mut out, "title", &a.title, &b.title, Severity::Critical, QualityDimension::Consistency);
    exact(&mut out, "status", &a.status, &b.status, Severity::Critical, QualityDimension::Consistency);
    exact(&mut out, "owner_id", &a.owner_id, &b.owner_id, Severity::Critical, QualityDimension::Consistency);
    exact(&mut out, "project_id", &a.project_id, &b.project_id, Severity::Warning, QualityDimension::Consistency);
    timestamp(&mut out, "created_at", a.created_at, b.created_at, tolerance_ms);
    timestamp(&mut out, "updated_at", a.updated_at, b.updated_at, tolerance_ms);

    // Identical payloads hash identically; skip the walk.
    if a.content_hash() != b.content_hash() {
        compare_payloads(&mut out, &a.payload, &b.payload);
    }
    out
}

fn compare_payloads(out: &mut Vec<Violation>, a: &Payload, b: &Payload) {
    match (a, b) {
        (Payload::Story(a), Payload::Story(b)) => stories(out, a, b),
        (Payload::Scenario(a), Payload::Scenario(b)) => scenarios(out, a, b),
        (Payload::Prompt(a), Payload::Prompt(b)) => prompts(out, a, b),
        (Payload::VideoJob(a), Payload::VideoJob(b)) => video_jobs(out, a, b),
        _ => out.push(
            Violation::new("payload.type", "payload shape differs", Severity::Critical, QualityDimension::Consistency)
                .with_values(a.content_type(), b.content_type()),
        ),
    }
}

fn stories(out: &mut Vec<Violation>, a: &StoryPayload, b: &StoryPayload) {
    text(out, "payload.data.content", &a.content, &b.content, Severity::Critical, QualityDimension::Accuracy);
    optional_text(out, "payload.data.genre", &a.genre, &b.genre);
    exact(out, "payload.data.word_count", &a.word_count, &b.word_count, Severity::Warning, QualityDimension::Accuracy);
    unordered(out, "payload.data.tags", &a.tags, &b.tags);
}

fn scenarios(out: &mut Vec<Violation>, a: &ScenarioPayload, b: &ScenarioPayload) {
    text(out, "payload.data.description", &a.description, &b.description, Severity::Critical, QualityDimension::Accuracy);
    if a.characters.len() != b.characters.len() {
        out.push(
            Violation::new(
                "payload.data.characters",
                "character count differs",
                Severity::Warning,
                QualityDimension::Completeness,
            )
            .with_values(a.characters.len(), b.characters.len()),
        );
    } else {
        unordered(out, "payload.data.characters", &a.characters, &b.characters);
    }
    optional_text(out, "payload.data.setting", &a.setting, &b.setting);
    exact(out, "payload.data.story_id", &a.story_id, &b.story_id, Severity::Warning, QualityDimension::Consistency);
}

fn prompts(out: &mut Vec<Violation>, a: &PromptPayload, b: &PromptPayload) {
    text(out, "payload.data.text", &a.text, &b.text, Severity::Critical, QualityDimension::Accuracy);
    optional_text(out, "payload.data.model", &a.model, &b.model);
    exact(out, "payload.data.variables", &a.variables, &b.variables, Severity::Warning, QualityDimension::Accuracy);
    exact(out, "payload.data.usage_count", &a.usage_count, &b.usage_count, Severity::Warning, QualityDimension::Accuracy);
}

fn video_jobs(out: &mut Vec<Violation>, a: &VideoJobPayload, b: &VideoJobPayload) {
    text(out, "payload.data.provider", &a.provider, &b.provider, Severity::Critical, QualityDimension::Accuracy);
    exact(out, "payload.data.prompt_id", &a.prompt_id, &b.prompt_id, Severity::Warning, QualityDimension::Consistency);
    exact(out, "payload.data.progress", &a.progress, &b.progress, Severity::Warning, QualityDimension::Accuracy);
    exact(out, "payload.data.output_url", &a.output_url, &b.output_url, Severity::Warning, QualityDimension::Completeness);
    exact(
        out,
        "payload.data.duration_secs",
        &a.duration_secs,
        &b.duration_secs,
        Severity::Warning,
        QualityDimension::Accuracy,
    );
}

fn exact<T: PartialEq + Serialize>(
    out: &mut Vec<Violation>,
    field: &str,
    a: &T,
    b: &T,
    severity: Severity,
    dimension: QualityDimension,
) {
    if a != b {
        out.push(Violation::new(field, "values differ", severity, dimension).with_values(a, b));
    }
}

/// Text fields: whitespace-only differences are info, anything else
/// (case included) is `severity`.
fn text(
    out: &mut Vec<Violation>,
    field: &str,
    a: &str,
    b: &str,
    severity: Severity,
    dimension: QualityDimension,
) {
    if a == b {
        return;
    }
    let (na, nb) = (normalize_text(a), normalize_text(b));
    let (issue, severity) = if na == nb {
        ("whitespace-only difference", Severity::Info)
    } else {
        ("values differ", severity)
    };
    out.push(Violation::new(field, issue, severity, dimension).with_values(a, b));
}

fn optional_text(out: &mut Vec<Violation>, field: &str, a: &Option<String>, b: &Option<String>) {
    match (a, b) {
        (Some(a), Some(b)) => text(out, field, a, b, Severity::Warning, QualityDimension::Accuracy),
        (None, None) => {}
        _ => exact(out, field, a, b, Severity::Warning, QualityDimension::Completeness),
    }
}

/// Lists whose order carries no meaning.
fn unordered(out: &mut Vec<Violation>, field: &str, a: &[String], b: &[String]) {
    if a == b {
        return;
    }
    let mut sa: Vec<&String> = a.iter().collect();
    let mut sb: Vec<&String> = b.iter().collect();
    sa.sort();
    sb.sort();
    if sa == sb {
        out.push(
            Violation::new(field, "ordering-only difference", Severity::Info, QualityDimension::Consistency)
                .with_values(a, b),
        );
        return;
    }
    let set_a: BTreeSet<&String> = sa.into_iter().collect();
    let set_b: BTreeSet<&String> = sb.into_iter().collect();
    let missing_b: Vec<&&String> = set_a.difference(&set_b).collect();
    let missing_a: Vec<&&String> = set_b.difference(&set_a).collect();
    out.push(
        Violation::new(
            field,
            format!("{} only on backendA, {} only on backendB", missing_b.len(), missing_a.len()),
            Severity::Warning,
            QualityDimension::Completeness,
        )
        .with_values(a, b),
    );
}

fn timestamp(out: &mut Vec<Violation>, field: &str, a: i64, b: i64, tolerance_ms: i64) {
    let skew = a.abs_diff(b);
    if skew > tolerance_ms.unsigned_abs() {
        out.push(
            Violation::new(
                field,
                format!("timestamps differ by {}ms", skew),
                Severity::Warning,
                QualityDimension::Timeliness,
            )
            .with_values(a, b),
        );
    }
}
