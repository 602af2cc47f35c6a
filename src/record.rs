// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Content record data model.
//!
//! A [`ContentRecord`] is the unit that flows through the engine: one story,
//! scenario, prompt or video job. The `(content_type, id)` pair is the join
//! key across both backends (see [`RecordKey`]).
//!
//! Records are never hard-deleted. Archival is a status transition.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Current time as epoch millis.
pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Kind of user-generated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Story,
    Scenario,
    Prompt,
    VideoJob,
}

impl ContentType {
    /// Every content type, in enumeration order.
    pub const ALL: [ContentType; 4] = [
        ContentType::Story,
        ContentType::Scenario,
        ContentType::Prompt,
        ContentType::VideoJob,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Story => "story",
            Self::Scenario => "scenario",
            Self::Prompt => "prompt",
            Self::VideoJob => "video_job",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "story" => Ok(Self::Story),
            "scenario" => Ok(Self::Scenario),
            "prompt" => Ok(Self::Prompt),
            "video_job" | "video-job" | "video" => Ok(Self::VideoJob),
            other => Err(format!("unknown content type '{}'", other)),
        }
    }
}

/// Lifecycle status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Processing,
    Completed,
    Failed,
    Archived,
}

impl ContentStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "archived" => Ok(Self::Archived),
            other => Err(format!("unknown content status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoryPayload {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    /// Denormalized word count, derived from `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScenarioPayload {
    pub description: String,
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PromptPayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Cached usage counter, maintained by the application layer.
    #[serde(default)]
    pub usage_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoJobPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    /// Render progress, 0-100.
    #[serde(default)]
    pub progress: u8,
}

/// Type-specific record body, tagged by content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Story(StoryPayload),
    Scenario(ScenarioPayload),
    Prompt(PromptPayload),
    VideoJob(VideoJobPayload),
}

impl Payload {
    /// The content type this payload shape belongs to.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Story(_) => ContentType::Story,
            Self::Scenario(_) => ContentType::Scenario,
            Self::Prompt(_) => ContentType::Prompt,
            Self::VideoJob(_) => ContentType::VideoJob,
        }
    }

    /// The primary text body (story content, scenario description, prompt
    /// text, video provider).
    #[must_use]
    pub fn body(&self) -> &str {
        match self {
            Self::Story(p) => &p.content,
            Self::Scenario(p) => &p.description,
            Self::Prompt(p) => &p.text,
            Self::VideoJob(p) => &p.provider,
        }
    }
}

/// Cross-backend join key: `(content_type, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub content_type: ContentType,
    pub id: String,
}

impl RecordKey {
    pub fn new(content_type: ContentType, id: impl Into<String>) -> Self {
        Self { content_type, id: id.into() }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.content_type, self.id)
    }
}

/// One piece of user-generated content.
///
/// # Example
///
/// ```
/// use content_sync::{ContentRecord, ContentType, Payload, StoryPayload};
///
/// let record = ContentRecord::new(
///     "s1",
///     "A",
///     Payload::Story(StoryPayload { content: "Once upon a time".into(), ..Default::default() }),
/// );
///
/// assert_eq!(record.content_type, ContentType::Story);
/// assert_eq!(record.key().to_string(), "story:s1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub title: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub status: ContentStatus,
    pub payload: Payload,
    /// Creation timestamp (epoch millis)
    pub created_at: i64,
    /// Last update timestamp (epoch millis)
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl ContentRecord {
    /// Create a draft record. The content type is taken from the payload.
    pub fn new(id: impl Into<String>, title: impl Into<String>, payload: Payload) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            content_type: payload.content_type(),
            title: title.into(),
            owner_id: None,
            status: ContentStatus::Draft,
            payload,
            created_at: now,
            updated_at: now,
            project_id: None,
        }
    }

    /// Create a draft record with a pre-generated UUID id.
    pub fn with_generated_id(title: impl Into<String>, payload: Payload) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), title, payload)
    }

    #[must_use]
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    #[must_use]
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: ContentStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.content_type, self.id.clone())
    }

    /// Bump `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = now_millis().max(self.created_at);
    }

    /// Archive the record (the only form of deletion).
    pub fn archive(&mut self) {
        self.status = ContentStatus::Archived;
        self.touch();
    }

    /// SHA-256 of the canonical payload JSON, hex encoded.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let bytes = serde_json::to_vec(&self.payload).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}
