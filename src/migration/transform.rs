//! Normalization applied to each record before it is rewritten.
//!
//! Only lossless, idempotent fixes belong here: running a record through
//! [`prepare`] twice gives the same result as once, so reruns of a migration
//! converge.

use crate::record::{ContentRecord, Payload};

/// Trim the title and fill a story's missing `word_count`.
///
/// Timestamps are left alone so both backends keep the source's history.
#[must_use]
pub fn prepare(record: &ContentRecord) -> ContentRecord {
    let mut out = record.clone();

    let trimmed = out.title.trim();
    if !trimmed.is_empty() && trimmed.len() != out.title.len() {
        out.title = trimmed.to_string();
    }

    if let Payload::Story(ref mut story) = out.payload {
        if story.word_count.is_none() {
            story.word_count = Some(story.content.split_whitespace().count() as u32);
        }
    }

    out
}
