use std::sync::Arc;

use shared::{
    domain::{StoryForm, StoryParameters},
    protocol::SaveReceipt,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    config::ContinuationPolicy,
    error::{RequestError, SessionError},
    session::{Dispatch, OutboundRequest, Phase, SessionSnapshot, Settlement, StorySession},
    StoryBackend,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Segment(String),
    Saved(SaveReceipt),
}

/// Drives one [`StorySession`] against a [`StoryBackend`].
///
/// The session lock is only held while a transition is applied, never across
/// the network call, so a second write issued while one is outstanding sees
/// the in-flight phase and is turned away instead of being queued.
pub struct StoryController {
    backend: Arc<dyn StoryBackend>,
    session: Mutex<StorySession>,
}

impl StoryController {
    pub fn new(backend: Arc<dyn StoryBackend>, policy: ContinuationPolicy) -> Arc<Self> {
        Arc::new(Self {
            backend,
            session: Mutex::new(StorySession::new(policy)),
        })
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    pub async fn phase(&self) -> Phase {
        self.session.lock().await.phase()
    }

    /// Validates the form and starts the story. Validation failures never
    /// reach the backend.
    pub async fn start(&self, form: &StoryForm) -> Result<String, SessionError> {
        let dispatch = self.session.lock().await.begin_start_form(form)?;
        self.execute_segment(dispatch).await
    }

    pub async fn start_with(&self, parameters: StoryParameters) -> Result<String, SessionError> {
        let dispatch = self.session.lock().await.begin_start(parameters)?;
        self.execute_segment(dispatch).await
    }

    pub async fn set_pending_input(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.session.lock().await.set_pending_input(text)
    }

    /// Continues the story with `text`, which becomes the pending input only
    /// if the continuation is dispatched.
    pub async fn continue_story(&self, text: impl Into<String>) -> Result<String, SessionError> {
        let dispatch = self.session.lock().await.begin_continue_with(text)?;
        self.execute_segment(dispatch).await
    }

    /// Continues with whatever pending input is already set.
    pub async fn continue_pending(&self) -> Result<String, SessionError> {
        let dispatch = self.session.lock().await.begin_continue()?;
        self.execute_segment(dispatch).await
    }

    pub async fn save(&self) -> Result<SaveReceipt, SessionError> {
        let dispatch = self.session.lock().await.begin_save()?;
        match self.execute(dispatch).await? {
            OperationOutcome::Saved(receipt) => Ok(receipt),
            OperationOutcome::Segment(_) => unreachable!("save settles with a receipt"),
        }
    }

    pub async fn retry(&self) -> Result<OperationOutcome, SessionError> {
        let dispatch = self.session.lock().await.retry()?;
        self.execute(dispatch).await
    }

    pub async fn dismiss_error(&self) -> Result<Phase, SessionError> {
        self.session.lock().await.dismiss_error()
    }

    /// Tears the session down; in-flight responses are dropped on arrival.
    pub async fn close(&self) {
        self.session.lock().await.close();
    }

    async fn execute_segment(&self, dispatch: Dispatch) -> Result<String, SessionError> {
        match self.execute(dispatch).await? {
            OperationOutcome::Segment(content) => Ok(content),
            OperationOutcome::Saved(_) => unreachable!("start and continue settle with a segment"),
        }
    }

    async fn execute(&self, dispatch: Dispatch) -> Result<OperationOutcome, SessionError> {
        let Dispatch { ticket, request } = dispatch;
        match request {
            OutboundRequest::Start(request) => {
                let outcome = self.backend.start_story(request).await;
                let settled = self
                    .session
                    .lock()
                    .await
                    .settle_start(ticket, outcome.clone());
                finish(settled, outcome).map(OperationOutcome::Segment)
            }
            OutboundRequest::Continue(request) => {
                let outcome = self.backend.continue_story(request).await;
                let settled = self
                    .session
                    .lock()
                    .await
                    .settle_continue(ticket, outcome.clone());
                finish(settled, outcome).map(OperationOutcome::Segment)
            }
            OutboundRequest::Save(request) => {
                let outcome = self.backend.save_story(request).await;
                let settled = self
                    .session
                    .lock()
                    .await
                    .settle_save(ticket, outcome.clone());
                finish(settled, outcome).map(OperationOutcome::Saved)
            }
        }
    }
}

fn finish<T>(settled: Settlement, outcome: Result<T, RequestError>) -> Result<T, SessionError> {
    match settled {
        Settlement::Applied(phase) => {
            debug!(?phase, "operation settled");
            outcome.map_err(SessionError::from)
        }
        Settlement::Discarded => Err(SessionError::Closed),
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
