use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{StoryId, StoryParameters};

/// `POST /api/start-story`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartStoryRequest {
    pub genre: String,
    pub age: u32,
    pub choice_count: u32,
    pub page_count: u32,
    pub key_moments: String,
}

impl From<&StoryParameters> for StartStoryRequest {
    fn from(params: &StoryParameters) -> Self {
        Self {
            genre: params.genre.clone(),
            age: params.target_age,
            choice_count: params.choice_count,
            page_count: params.page_count,
            key_moments: params.seed_text.clone(),
        }
    }
}

/// `POST /api/continue-story`. `context` is only sent to stateless backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueStoryRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// `POST /api/save-story`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveStoryRequest {
    pub genre: String,
    pub age: u32,
    pub choice_count: u32,
    pub page_count: u32,
    pub content: String,
}

impl SaveStoryRequest {
    pub fn new(params: &StoryParameters, content: impl Into<String>) -> Self {
        Self {
            genre: params.genre.clone(),
            age: params.target_age,
            choice_count: params.choice_count,
            page_count: params.page_count,
            content: content.into(),
        }
    }
}

/// Body returned by both start and continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorySegmentResponse {
    pub content: String,
}

/// Whatever a save response happened to carry. The body is opaque, so both
/// fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_id: Option<StoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One row of `GET /api/stories`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedStoryRecord {
    pub story_id: StoryId,
    pub genre: String,
    pub age: u32,
    pub choice_count: u32,
    pub segment_count: u32,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}
