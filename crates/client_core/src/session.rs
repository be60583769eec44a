//! Story session state machine.
//!
//! Transitions are plain synchronous methods on [`StorySession`]. Beginning an
//! operation moves the session into an in-flight phase and hands back a
//! [`Dispatch`] carrying the request to send and a [`Ticket`]; the response is
//! applied later through one of the `settle_*` methods with that ticket. No I/O
//! happens here, see [`crate::controller::StoryController`] for the async side.
//!
//! ```text
//!  Idle ──start──▶ Starting ──ok──▶ Active ──continue──▶ Continuing ──ok──▶ Active
//!                     │               │  ▲                    │
//!                     └─err─▶ Failed ◀┼──┼────────────err─────┘
//!                              │      │  │
//!                            retry    save └──err── Saving ──ok──▶ Saved
//! ```

use std::fmt;

use shared::{
    domain::{StoryForm, StoryParameters},
    protocol::{ContinueStoryRequest, SaveReceipt, SaveStoryRequest, StartStoryRequest},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::ContinuationPolicy,
    error::{RequestError, SessionError},
};

/// Separator used when the segments are shown or saved as one text.
pub const SEGMENT_SEPARATOR: &str = "\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Starting,
    Active,
    Continuing,
    Saving,
    Saved,
    Failed,
}

impl Phase {
    /// A network operation is outstanding.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Phase::Starting | Phase::Continuing | Phase::Saving)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Start,
    Continue,
    Save,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Start => f.write_str("start"),
            Operation::Continue => f.write_str("continue"),
            Operation::Save => f.write_str("save"),
        }
    }
}

/// Identifies one dispatched operation. A settlement is only applied when its
/// ticket matches the operation the session is currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    session_id: Uuid,
    sequence: u64,
    operation: Operation,
}

impl Ticket {
    pub fn operation(&self) -> Operation {
        self.operation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundRequest {
    Start(StartStoryRequest),
    Continue(ContinueStoryRequest),
    Save(SaveStoryRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub ticket: Ticket,
    pub request: OutboundRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Applied(Phase),
    /// Stale or torn-down; nothing was changed.
    Discarded,
}

/// Read-only copy of the session for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub phase: Phase,
    pub parameters: Option<StoryParameters>,
    pub segments: Vec<String>,
    pub pending_input: String,
    pub last_error: Option<SessionError>,
    pub failed_operation: Option<Operation>,
    pub receipt: Option<SaveReceipt>,
}

impl SessionSnapshot {
    pub fn full_text(&self) -> String {
        self.segments.join(SEGMENT_SEPARATOR)
    }
}

#[derive(Debug)]
pub struct StorySession {
    id: Uuid,
    policy: ContinuationPolicy,
    phase: Phase,
    parameters: Option<StoryParameters>,
    segments: Vec<String>,
    pending_input: String,
    last_error: Option<SessionError>,
    failed_operation: Option<Operation>,
    receipt: Option<SaveReceipt>,
    in_flight: Option<Ticket>,
    next_sequence: u64,
    closed: bool,
}

impl StorySession {
    pub fn new(policy: ContinuationPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            policy,
            phase: Phase::Idle,
            parameters: None,
            segments: Vec::new(),
            pending_input: String::new(),
            last_error: None,
            failed_operation: None,
            receipt: None,
            in_flight: None,
            next_sequence: 0,
            closed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    pub fn parameters(&self) -> Option<&StoryParameters> {
        self.parameters.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn full_text(&self) -> String {
        self.segments.join(SEGMENT_SEPARATOR)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            phase: self.phase,
            parameters: self.parameters.clone(),
            segments: self.segments.clone(),
            pending_input: self.pending_input.clone(),
            last_error: self.last_error.clone(),
            failed_operation: self.failed_operation,
            receipt: self.receipt.clone(),
        }
    }

    /// Idle → Starting. Invalid parameters are recorded as the last error and
    /// leave the session Idle; nothing is dispatched.
    pub fn begin_start(&mut self, parameters: StoryParameters) -> Result<Dispatch, SessionError> {
        self.guard(Operation::Start, &[Phase::Idle])?;
        if let Err(err) = parameters.validate() {
            return Err(self.reject_parameters(err.into()));
        }

        let request = StartStoryRequest::from(&parameters);
        self.parameters = Some(parameters);
        Ok(self.dispatch(Operation::Start, Phase::Starting, OutboundRequest::Start(request)))
    }

    /// Like [`StorySession::begin_start`] but validates raw form input. The
    /// phase is checked before the form, so a busy session reports the phase
    /// rather than a form error.
    pub fn begin_start_form(&mut self, form: &StoryForm) -> Result<Dispatch, SessionError> {
        self.guard(Operation::Start, &[Phase::Idle])?;
        match form.validate() {
            Ok(parameters) => self.begin_start(parameters),
            Err(err) => Err(self.reject_parameters(err.into())),
        }
    }

    /// Records a local validation failure without leaving Idle.
    fn reject_parameters(&mut self, err: SessionError) -> SessionError {
        if self.phase == Phase::Idle && !self.closed {
            debug!(session_id = %self.id, "start rejected: {err}");
            self.last_error = Some(err.clone());
        }
        err
    }

    pub fn set_pending_input(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        self.guard(Operation::Continue, &[Phase::Active, Phase::Failed])?;
        self.pending_input = text.into();
        Ok(())
    }

    /// Active → Continuing with the current pending input.
    pub fn begin_continue(&mut self) -> Result<Dispatch, SessionError> {
        self.guard(Operation::Continue, &[Phase::Active])?;
        self.dispatch_continue()
    }

    /// Active → Continuing with `text`. The pending input is only replaced
    /// once the continuation is certain to be dispatched; a rejected call
    /// leaves it as it was.
    pub fn begin_continue_with(&mut self, text: impl Into<String>) -> Result<Dispatch, SessionError> {
        self.guard(Operation::Continue, &[Phase::Active])?;
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }
        self.pending_input = text;
        self.dispatch_continue()
    }

    /// Active → Saving with the whole story and the original parameters.
    pub fn begin_save(&mut self) -> Result<Dispatch, SessionError> {
        self.guard(Operation::Save, &[Phase::Active])?;
        self.dispatch_save()
    }

    /// Failed → re-enters the phase of the operation that failed.
    pub fn retry(&mut self) -> Result<Dispatch, SessionError> {
        let operation = self.failed_operation.unwrap_or(Operation::Start);
        self.guard(operation, &[Phase::Failed])?;
        match operation {
            Operation::Start => {
                let Some(parameters) = self.parameters.as_ref() else {
                    return Err(SessionError::InvalidPhase {
                        operation,
                        phase: self.phase,
                    });
                };
                let request = StartStoryRequest::from(parameters);
                Ok(self.dispatch(Operation::Start, Phase::Starting, OutboundRequest::Start(request)))
            }
            Operation::Continue => self.dispatch_continue(),
            Operation::Save => self.dispatch_save(),
        }
    }

    /// Leaves Failed without retrying. Content, if any, is kept and the
    /// session becomes Active again; a failed start goes back to Idle.
    pub fn dismiss_error(&mut self) -> Result<Phase, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        match self.phase {
            Phase::Failed if self.segments.is_empty() => {
                self.phase = Phase::Idle;
                self.parameters = None;
            }
            Phase::Failed => self.phase = Phase::Active,
            Phase::Idle | Phase::Active => {}
            phase if phase.is_in_flight() => return Err(SessionError::OperationInProgress { phase }),
            phase => {
                return Err(SessionError::InvalidPhase {
                    operation: self.failed_operation.unwrap_or(Operation::Start),
                    phase,
                })
            }
        }
        self.last_error = None;
        self.failed_operation = None;
        Ok(self.phase)
    }

    pub fn settle_start(
        &mut self,
        ticket: Ticket,
        outcome: Result<String, RequestError>,
    ) -> Settlement {
        if !self.accept(ticket, Operation::Start) {
            return Settlement::Discarded;
        }
        match outcome {
            Ok(content) => {
                self.segments = vec![content];
                self.phase = Phase::Active;
                self.failed_operation = None;
                info!(session_id = %self.id, "story started");
            }
            Err(err) => self.fail(Operation::Start, err),
        }
        Settlement::Applied(self.phase)
    }

    pub fn settle_continue(
        &mut self,
        ticket: Ticket,
        outcome: Result<String, RequestError>,
    ) -> Settlement {
        if !self.accept(ticket, Operation::Continue) {
            return Settlement::Discarded;
        }
        match outcome {
            Ok(content) => {
                self.segments.push(content);
                self.pending_input.clear();
                self.phase = Phase::Active;
                self.failed_operation = None;
                info!(
                    session_id = %self.id,
                    segments = self.segments.len(),
                    "story continued"
                );
            }
            Err(err) => self.fail(Operation::Continue, err),
        }
        Settlement::Applied(self.phase)
    }

    /// A failed save returns to Active rather than Failed: the story is
    /// intact and save can simply be requested again.
    pub fn settle_save(
        &mut self,
        ticket: Ticket,
        outcome: Result<SaveReceipt, RequestError>,
    ) -> Settlement {
        if !self.accept(ticket, Operation::Save) {
            return Settlement::Discarded;
        }
        match outcome {
            Ok(receipt) => {
                self.phase = Phase::Saved;
                self.receipt = Some(receipt);
                info!(session_id = %self.id, segments = self.segments.len(), "story saved");
            }
            Err(err) => {
                warn!(session_id = %self.id, kind = ?err.kind(), "save failed: {err}");
                self.last_error = Some(err.into());
                self.phase = Phase::Active;
            }
        }
        Settlement::Applied(self.phase)
    }

    /// Tears the session down. Responses that arrive afterwards are dropped.
    pub fn close(&mut self) {
        if !self.closed {
            debug!(session_id = %self.id, phase = ?self.phase, "session closed");
        }
        self.closed = true;
        self.in_flight = None;
    }

    fn guard(&self, operation: Operation, allowed: &[Phase]) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if self.phase.is_in_flight() {
            return Err(SessionError::OperationInProgress { phase: self.phase });
        }
        if !allowed.contains(&self.phase) {
            return Err(SessionError::InvalidPhase {
                operation,
                phase: self.phase,
            });
        }
        Ok(())
    }

    fn dispatch_continue(&mut self) -> Result<Dispatch, SessionError> {
        if self.pending_input.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }
        let context = match self.policy {
            ContinuationPolicy::InputOnly => None,
            ContinuationPolicy::FullContext => Some(self.full_text()),
        };
        let request = ContinueStoryRequest {
            text: self.pending_input.clone(),
            context,
        };
        Ok(self.dispatch(
            Operation::Continue,
            Phase::Continuing,
            OutboundRequest::Continue(request),
        ))
    }

    fn dispatch_save(&mut self) -> Result<Dispatch, SessionError> {
        let Some(parameters) = self.parameters.as_ref() else {
            return Err(SessionError::InvalidPhase {
                operation: Operation::Save,
                phase: self.phase,
            });
        };
        let request = SaveStoryRequest::new(parameters, self.full_text());
        Ok(self.dispatch(Operation::Save, Phase::Saving, OutboundRequest::Save(request)))
    }

    fn dispatch(&mut self, operation: Operation, phase: Phase, request: OutboundRequest) -> Dispatch {
        let ticket = Ticket {
            session_id: self.id,
            sequence: self.next_sequence,
            operation,
        };
        self.next_sequence += 1;
        self.in_flight = Some(ticket);
        self.last_error = None;
        self.phase = phase;
        debug!(session_id = %self.id, %operation, sequence = ticket.sequence, "dispatching");
        Dispatch { ticket, request }
    }

    fn accept(&mut self, ticket: Ticket, operation: Operation) -> bool {
        if self.closed || ticket.operation != operation || self.in_flight != Some(ticket) {
            debug!(
                session_id = %self.id,
                %operation,
                sequence = ticket.sequence,
                "discarding stale response"
            );
            return false;
        }
        self.in_flight = None;
        true
    }

    fn fail(&mut self, operation: Operation, err: RequestError) {
        warn!(session_id = %self.id, %operation, kind = ?err.kind(), "operation failed: {err}");
        self.last_error = Some(err.into());
        self.failed_operation = Some(operation);
        self.phase = Phase::Failed;
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
