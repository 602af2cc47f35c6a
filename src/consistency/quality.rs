//! Single-record quality pre-check.
//!
//! Looks at one record in isolation (no second backend) and flags content
//! that is structurally valid but not worth migrating as-is.

use std::collections::HashSet;

use super::report::{QualityDimension, Severity, Violation};
use crate::record::{now_millis, ContentRecord, ContentStatus, Payload};
use crate::schema::Validate;

fn body_path(payload: &Payload) -> &'static str {
    match payload {
        Payload::Story(_) => "payload.data.content",
        Payload::Scenario(_) => "payload.data.description",
        Payload::Prompt(_) => "payload.data.text",
        Payload::VideoJob(_) => "payload.data.provider",
    }
}

fn duplicates<'a>(items: impl Iterator<Item = &'a String>) -> usize {
    let mut seen = HashSet::new();
    items.filter(|s| !seen.insert(s.trim().to_lowercase())).count()
}

/// Quality findings for one record.
///
/// Field names match schema paths so a schema failure that is already
/// reported by a dedicated check is not counted twice.
#[must_use]
pub fn assess_record(record: &ContentRecord, future_tolerance_ms: i64) -> Vec<Violation> {
    let mut out = Vec::new();

    if record.title.trim().is_empty() {
        out.push(Violation::new("title", "title is blank", Severity::Critical, QualityDimension::Completeness));
    } else if record.title != record.title.trim() {
        out.push(Violation::new(
            "title",
            "title has surrounding whitespace",
            Severity::Info,
            QualityDimension::Accuracy,
        ));
    }

    if record.payload.body().trim().is_empty() {
        out.push(Violation::new(
            body_path(&record.payload),
            "primary body is blank",
            Severity::Critical,
            QualityDimension::Completeness,
        ));
    }

    if record.updated_at < record.created_at {
        out.push(
            Violation::new("updated_at", "updated before created", Severity::Critical, QualityDimension::Timeliness)
                .with_values(record.created_at, record.updated_at),
        );
    }

    if record.owner_id.is_none() {
        out.push(Violation::new("owner_id", "record has no owner", Severity::Warning, QualityDimension::Completeness));
    }

    let horizon = now_millis() + future_tolerance_ms;
    for (field, ts) in [("created_at", record.created_at), ("updated_at", record.updated_at)] {
        if ts > horizon {
            out.push(
                Violation::new(field, "timestamp is in the future", Severity::Warning, QualityDimension::Timeliness)
                    .with_values(ts, horizon),
            );
        }
    }

    match &record.payload {
        Payload::Story(story) => {
            let actual = story.content.split_whitespace().count() as u32;
            if let Some(stored) = story.word_count {
                if stored != actual {
                    out.push(
                        Violation::new(
                            "payload.data.word_count",
                            "word count does not match content",
                            Severity::Warning,
                            QualityDimension::Accuracy,
                        )
                        .with_values(stored, actual),
                    );
                }
            }
            if duplicates(story.tags.iter()) > 0 {
                out.push(Violation::new(
                    "payload.data.tags",
                    "duplicate tags",
                    Severity::Info,
                    QualityDimension::Consistency,
                ));
            }
        }
        Payload::Scenario(scenario) => {
            if duplicates(scenario.characters.iter()) > 0 {
                out.push(Violation::new(
                    "payload.data.characters",
                    "duplicate characters",
                    Severity::Info,
                    QualityDimension::Consistency,
                ));
            }
        }
        Payload::Prompt(_) => {}
        Payload::VideoJob(job) => {
            if record.status == ContentStatus::Completed {
                if job.output_url.is_none() {
                    out.push(Violation::new(
                        "payload.data.output_url",
                        "completed job has no output",
                        Severity::Critical,
                        QualityDimension::Completeness,
                    ));
                }
                if job.progress < 100 {
                    out.push(
                        Violation::new(
                            "payload.data.progress",
                            "completed job is not at 100%",
                            Severity::Critical,
                            QualityDimension::Accuracy,
                        )
                        .with_values(job.progress, 100),
                    );
                }
            } else if job.progress == 100
                && !matches!(record.status, ContentStatus::Failed | ContentStatus::Archived)
            {
                out.push(Violation::new(
                    "status",
                    "job at 100% but not completed",
                    Severity::Warning,
                    QualityDimension::Consistency,
                ));
            }
        }
    }

    if let Err(e) = record.validate() {
        if !out.iter().any(|v| v.field == e.path) {
            out.push(Violation::new(
                e.path,
                format!("schema: {}", e.message),
                Severity::Critical,
                QualityDimension::Accuracy,
            ));
        }
    }

    out
}
