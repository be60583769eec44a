use std::sync::Arc;

use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use shared::{domain::StoryId, protocol::SavedStoryRecord};
use tracing::{info, warn};

use crate::{
    error::{LibraryError, RequestError},
    StoryBackend,
};

/// What a list view renders. Errors here are for display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryView {
    Loading,
    Loaded(Vec<SavedStoryRecord>),
    Failed(String),
}

/// Read-only access to saved stories, plus delete. Independent of any
/// story session.
pub struct StoryLibrary {
    backend: Arc<dyn StoryBackend>,
    view: LibraryView,
}

impl StoryLibrary {
    pub fn new(backend: Arc<dyn StoryBackend>) -> Self {
        Self {
            backend,
            view: LibraryView::Loading,
        }
    }

    pub fn view(&self) -> &LibraryView {
        &self.view
    }

    /// A fresh, lazy listing. Nothing is fetched until the stream is first
    /// polled, and every call fetches again.
    pub fn stories(&self) -> BoxStream<'static, Result<SavedStoryRecord, RequestError>> {
        let backend = Arc::clone(&self.backend);
        stream::once(async move { backend.list_stories().await })
            .flat_map(|result| match result {
                Ok(records) => stream::iter(records.into_iter().map(Ok)).left_stream(),
                Err(err) => stream::iter(std::iter::once(Err(err))).right_stream(),
            })
            .boxed()
    }

    pub async fn refresh(&mut self) -> &LibraryView {
        self.view = LibraryView::Loading;
        self.view = match self.backend.list_stories().await {
            Ok(records) => {
                info!(count = records.len(), "loaded saved stories");
                LibraryView::Loaded(records)
            }
            Err(err) => {
                warn!(kind = ?err.kind(), "failed to load saved stories: {err}");
                LibraryView::Failed(err.to_string())
            }
        };
        &self.view
    }

    pub async fn detail(&self, story_id: StoryId) -> Result<SavedStoryRecord, LibraryError> {
        let records = self.backend.list_stories().await?;
        records
            .into_iter()
            .find(|record| record.story_id == story_id)
            .ok_or(LibraryError::NotFound(story_id))
    }

    /// Deletes one story and reloads the list.
    pub async fn delete(&mut self, story_id: StoryId) -> Result<(), LibraryError> {
        if let Err(err) = self.backend.delete_story(story_id).await {
            warn!(%story_id, "failed to delete story: {err}");
            self.view = LibraryView::Failed(err.to_string());
            return Err(err.into());
        }
        info!(%story_id, "deleted story");
        self.refresh().await;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/library_tests.rs"]
mod tests;
