use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::StoryId,
    protocol::{
        ContinueStoryRequest, SaveReceipt, SaveStoryRequest, SavedStoryRecord, StartStoryRequest,
        StorySegmentResponse,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{config::Settings, error::RequestError, StoryBackend};

const START_STORY_PATH: &str = "api/start-story";
const CONTINUE_STORY_PATH: &str = "api/continue-story";
const SAVE_STORY_PATH: &str = "api/save-story";
const STORIES_PATH: &str = "api/stories";

/// [`StoryBackend`] over JSON/HTTP.
pub struct HttpStoryBackend {
    http: Client,
    base_url: Url,
}

impl HttpStoryBackend {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self::with_client(http, settings.backend_base_url()?))
    }

    pub fn with_client(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    fn endpoint(&self, path: &str) -> Result<Url, RequestError> {
        self.base_url
            .join(path)
            .map_err(|err| RequestError::transport(format!("invalid endpoint {path}: {err}")))
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Vec<u8>, RequestError> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let response = self.http.post(url).json(body).send().await?;
        read_success(response).await
    }

    async fn post_for_segment<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<String, RequestError> {
        let body = self.post_json(path, body).await?;
        let segment: StorySegmentResponse = decode(&body)?;
        Ok(segment.content)
    }
}

/// Reads the whole body, turning a non-success status into
/// [`RequestError::Backend`] with whatever the backend sent.
async fn read_success(response: Response) -> Result<Vec<u8>, RequestError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|err| RequestError::transport(format!("failed to read response body: {err}")))?
        .to_vec();

    if !status.is_success() {
        let text = String::from_utf8_lossy(&body);
        warn!(status = status.as_u16(), "backend rejected request");
        return Err(RequestError::backend(status.as_u16(), &text));
    }
    Ok(body)
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, RequestError> {
    serde_json::from_slice(body).map_err(|err| RequestError::decode(err.to_string()))
}

#[async_trait]
impl StoryBackend for HttpStoryBackend {
    async fn start_story(&self, request: StartStoryRequest) -> Result<String, RequestError> {
        self.post_for_segment(START_STORY_PATH, &request).await
    }

    async fn continue_story(&self, request: ContinueStoryRequest) -> Result<String, RequestError> {
        self.post_for_segment(CONTINUE_STORY_PATH, &request).await
    }

    async fn save_story(&self, request: SaveStoryRequest) -> Result<SaveReceipt, RequestError> {
        let body = self.post_json(SAVE_STORY_PATH, &request).await?;
        // Save answers with a status only; the body is informational.
        Ok(serde_json::from_slice(&body).unwrap_or_default())
    }

    async fn list_stories(&self) -> Result<Vec<SavedStoryRecord>, RequestError> {
        let url = self.endpoint(STORIES_PATH)?;
        debug!(%url, "GET");
        let response = self.http.get(url).send().await?;
        let body = read_success(response).await?;
        decode(&body)
    }

    async fn delete_story(&self, story_id: StoryId) -> Result<(), RequestError> {
        let url = self.endpoint(&format!("{STORIES_PATH}/{story_id}"))?;
        debug!(%url, "DELETE");
        let response = self.http.delete(url).send().await?;
        read_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
