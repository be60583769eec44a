use async_trait::async_trait;
use shared::{
    domain::StoryId,
    protocol::{
        ContinueStoryRequest, SaveReceipt, SaveStoryRequest, SavedStoryRecord, StartStoryRequest,
    },
};

pub mod config;
pub mod controller;
pub mod error;
pub mod library;
pub mod session;
pub mod transport;

pub use config::{load_settings, load_settings_from, ContinuationPolicy, Settings};
pub use controller::StoryController;
pub use error::{FailureKind, LibraryError, RequestError, SessionError};
pub use library::{LibraryView, StoryLibrary};
pub use session::{Operation, Phase, SessionSnapshot, StorySession};
pub use transport::HttpStoryBackend;

/// The story generation backend. Each call is exactly one request and settles
/// as either its payload or a [`RequestError`].
#[async_trait]
pub trait StoryBackend: Send + Sync {
    async fn start_story(&self, request: StartStoryRequest) -> Result<String, RequestError>;
    async fn continue_story(&self, request: ContinueStoryRequest) -> Result<String, RequestError>;
    async fn save_story(&self, request: SaveStoryRequest) -> Result<SaveReceipt, RequestError>;
    async fn list_stories(&self) -> Result<Vec<SavedStoryRecord>, RequestError>;
    async fn delete_story(&self, story_id: StoryId) -> Result<(), RequestError>;
}
