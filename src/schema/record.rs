//! Record contracts.

use super::{check_identifier, check_percent, ensure, Validate, ValidationError, MAX_BODY_LEN, MAX_TITLE_LEN};
use crate::record::{ContentRecord, ContentStatus, Payload, VideoJobPayload};

impl Validate for ContentRecord {
    fn validate(&self) -> Result<(), ValidationError> {
        check_identifier(&self.id, "id")?;

        ensure(!self.title.trim().is_empty(), "title", "must not be blank")?;
        ensure(
            self.title.chars().count() <= MAX_TITLE_LEN,
            "title",
            format!("must be at most {} characters", MAX_TITLE_LEN),
        )?;

        if let Some(ref owner) = self.owner_id {
            check_identifier(owner, "owner_id")?;
        }
        if let Some(ref project) = self.project_id {
            check_identifier(project, "project_id")?;
        }

        ensure(self.created_at > 0, "created_at", "must be a positive epoch millis timestamp")?;
        ensure(
            self.updated_at >= self.created_at,
            "updated_at",
            format!("must not precede created_at ({} < {})", self.updated_at, self.created_at),
        )?;

        ensure(
            self.payload.content_type() == self.content_type,
            "payload.type",
            format!(
                "payload is '{}' but record type is '{}'",
                self.payload.content_type(),
                self.content_type
            ),
        )?;

        validate_payload(&self.payload, self.status)
    }
}

fn validate_payload(payload: &Payload, status: ContentStatus) -> Result<(), ValidationError> {
    ensure(
        payload.body().len() <= MAX_BODY_LEN,
        "payload.data",
        format!("body exceeds {} bytes", MAX_BODY_LEN),
    )?;

    match payload {
        Payload::Story(story) => {
            // Drafts may be saved before any text exists.
            if status != ContentStatus::Draft {
                ensure(!story.content.trim().is_empty(), "payload.data.content", "must not be blank")?;
            }
            for (i, tag) in story.tags.iter().enumerate() {
                ensure(!tag.trim().is_empty(), &format!("payload.data.tags[{}]", i), "must not be blank")?;
            }
            Ok(())
        }
        Payload::Scenario(scenario) => {
            ensure(
                !scenario.description.trim().is_empty(),
                "payload.data.description",
                "must not be blank",
            )?;
            if let Some(ref story_id) = scenario.story_id {
                check_identifier(story_id, "payload.data.story_id")?;
            }
            Ok(())
        }
        Payload::Prompt(prompt) => {
            ensure(!prompt.text.trim().is_empty(), "payload.data.text", "must not be blank")?;
            for name in prompt.variables.keys() {
                ensure(
                    !name.is_empty() && !name.contains(char::is_whitespace),
                    "payload.data.variables",
                    format!("invalid variable name '{}'", name),
                )?;
            }
            Ok(())
        }
        Payload::VideoJob(job) => validate_video_job(job, status),
    }
}

fn validate_video_job(job: &VideoJobPayload, status: ContentStatus) -> Result<(), ValidationError> {
    ensure(!job.provider.trim().is_empty(), "payload.data.provider", "must not be blank")?;
    check_percent(job.progress, "payload.data.progress")?;
    if let Some(ref prompt_id) = job.prompt_id {
        check_identifier(prompt_id, "payload.data.prompt_id")?;
    }
    if let Some(ref url) = job.output_url {
        ensure(
            url.starts_with("https://") || url.starts_with("http://"),
            "payload.data.output_url",
            "must be an http(s) URL",
        )?;
    }
    if status == ContentStatus::Completed {
        ensure(
            job.output_url.is_some(),
            "payload.data.output_url",
            "required once the job is completed",
        )?;
    }
    Ok(())
}
