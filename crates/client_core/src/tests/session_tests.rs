use super::*;
use shared::domain::{StoryForm, ValidationError};

fn fantasy() -> StoryParameters {
    StoryParameters {
        genre: "Fantasy".into(),
        target_age: 10,
        choice_count: 2,
        page_count: 3,
        seed_text: "a dragon".into(),
    }
}

fn active_session(policy: ContinuationPolicy) -> StorySession {
    let mut session = StorySession::new(policy);
    let dispatch = session.begin_start(fantasy()).expect("start");
    session.settle_start(dispatch.ticket, Ok("Once upon a time...".into()));
    session
}

fn backend_failure() -> RequestError {
    RequestError::backend(500, r#"{"error": "Failed to continue story"}"#)
}

#[test]
fn start_passes_through_starting_into_active() {
    let mut session = StorySession::new(ContinuationPolicy::InputOnly);
    assert_eq!(session.phase(), Phase::Idle);
    assert!(session.segments().is_empty());

    let dispatch = session.begin_start(fantasy()).expect("start");
    assert_eq!(session.phase(), Phase::Starting);
    assert!(session.segments().is_empty());
    assert_eq!(
        dispatch.request,
        OutboundRequest::Start(StartStoryRequest {
            genre: "Fantasy".into(),
            age: 10,
            choice_count: 2,
            page_count: 3,
            key_moments: "a dragon".into(),
        })
    );

    let settled = session.settle_start(dispatch.ticket, Ok("Once upon a time...".into()));
    assert_eq!(settled, Settlement::Applied(Phase::Active));
    assert_eq!(session.segments(), ["Once upon a time...".to_string()]);
}

#[test]
fn failed_start_keeps_parameters_for_retry() {
    let mut session = StorySession::new(ContinuationPolicy::InputOnly);
    let dispatch = session.begin_start(fantasy()).expect("start");
    session.settle_start(
        dispatch.ticket,
        Err(RequestError::transport("connection refused")),
    );

    assert_eq!(session.phase(), Phase::Failed);
    assert!(session.segments().is_empty());
    assert_eq!(session.parameters(), Some(&fantasy()));
    assert!(matches!(
        session.last_error(),
        Some(SessionError::Request(RequestError::Transport { .. }))
    ));

    let retry = session.retry().expect("retry");
    assert!(session.last_error().is_none());
    assert_eq!(session.phase(), Phase::Starting);
    assert!(matches!(retry.request, OutboundRequest::Start(_)));
    session.settle_start(retry.ticket, Ok("Once upon a time...".into()));
    assert_eq!(session.phase(), Phase::Active);
}

#[test]
fn invalid_parameters_never_leave_idle() {
    let mut session = StorySession::new(ContinuationPolicy::InputOnly);
    let mut params = fantasy();
    params.page_count = 0;

    let err = session.begin_start(params).expect_err("invalid");
    assert!(matches!(err, SessionError::Validation(ValidationError::NotPositive(_))));
    assert_eq!(session.phase(), Phase::Idle);
    assert!(session.parameters().is_none());
    assert_eq!(session.last_error(), Some(&err));
}

#[test]
fn form_validation_errors_are_recorded_on_idle_session() {
    let mut session = StorySession::new(ContinuationPolicy::InputOnly);
    let form = StoryForm {
        genre: String::new(),
        ..StoryForm::default()
    };
    let err = session.reject_parameters(form.validate().expect_err("invalid").into());
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.last_error(), Some(&err));
}

#[test]
fn continue_is_rejected_outside_active_without_side_effects() {
    let mut idle = StorySession::new(ContinuationPolicy::InputOnly);
    assert!(matches!(
        idle.begin_continue(),
        Err(SessionError::InvalidPhase {
            operation: Operation::Continue,
            phase: Phase::Idle
        })
    ));

    let mut starting = StorySession::new(ContinuationPolicy::InputOnly);
    starting.begin_start(fantasy()).expect("start");
    assert_eq!(
        starting.begin_continue().expect_err("in flight"),
        SessionError::OperationInProgress {
            phase: Phase::Starting
        }
    );
    assert_eq!(starting.phase(), Phase::Starting);
    assert!(starting.last_error().is_none());
}

#[test]
fn second_continue_while_in_flight_is_rejected() {
    let mut session = active_session(ContinuationPolicy::InputOnly);
    session
        .set_pending_input("the hero enters the cave")
        .expect("input");
    let first = session.begin_continue().expect("first");

    assert_eq!(
        session.begin_continue().expect_err("second"),
        SessionError::OperationInProgress {
            phase: Phase::Continuing
        }
    );
    assert_eq!(
        session.set_pending_input("something else").expect_err("typing"),
        SessionError::OperationInProgress {
            phase: Phase::Continuing
        }
    );
    assert_eq!(session.pending_input(), "the hero enters the cave");

    session.settle_continue(first.ticket, Ok("It was dark.".into()));
    assert_eq!(
        session.segments(),
        ["Once upon a time...".to_string(), "It was dark.".to_string()]
    );
    assert_eq!(session.pending_input(), "");
    assert_eq!(session.phase(), Phase::Active);
}

#[test]
fn empty_input_does_not_dispatch() {
    let mut session = active_session(ContinuationPolicy::InputOnly);
    session.set_pending_input("   ").expect("input");
    assert_eq!(session.begin_continue().expect_err("empty"), SessionError::EmptyInput);
    assert_eq!(session.phase(), Phase::Active);
}

#[test]
fn n_continuations_yield_n_plus_one_segments_in_order() {
    let mut session = active_session(ContinuationPolicy::InputOnly);
    for round in 0..5 {
        session.set_pending_input(format!("choice {round}")).expect("input");
        let dispatch = session.begin_continue().expect("continue");
        session.settle_continue(dispatch.ticket, Ok(format!("segment {round}")));
    }

    let segments = session.segments();
    assert_eq!(segments.len(), 6);
    assert_eq!(segments[0], "Once upon a time...");
    for (round, segment) in segments[1..].iter().enumerate() {
        assert_eq!(segment, &format!("segment {round}"));
    }
}

#[test]
fn failed_continue_preserves_content_and_input() {
    let mut session = active_session(ContinuationPolicy::InputOnly);
    session
        .set_pending_input("the hero enters the cave")
        .expect("input");
    let before_segments = session.segments().to_vec();
    let before_input = session.pending_input().to_string();

    let dispatch = session.begin_continue().expect("continue");
    session.settle_continue(dispatch.ticket, Err(backend_failure()));

    assert_eq!(session.phase(), Phase::Failed);
    assert_eq!(session.segments(), before_segments.as_slice());
    assert_eq!(session.pending_input(), before_input);
    assert!(session.last_error().is_some());

    let retry = session.retry().expect("retry");
    assert_eq!(session.phase(), Phase::Continuing);
    assert!(session.last_error().is_none());
    assert_eq!(
        retry.request,
        OutboundRequest::Continue(ContinueStoryRequest {
            text: "the hero enters the cave".into(),
            context: None,
        })
    );
}

#[test]
fn input_can_be_edited_before_retrying_a_failed_continue() {
    let mut session = active_session(ContinuationPolicy::InputOnly);
    session.set_pending_input("go left").expect("input");
    let dispatch = session.begin_continue().expect("continue");
    session.settle_continue(dispatch.ticket, Err(backend_failure()));

    session.set_pending_input("go right").expect("edit while failed");
    assert!(session.begin_continue().is_err());
    let retry = session.retry().expect("retry");
    let OutboundRequest::Continue(request) = retry.request else {
        panic!("expected continue request");
    };
    assert_eq!(request.text, "go right");
}

#[test]
fn full_context_policy_resends_accumulated_story() {
    let mut session = active_session(ContinuationPolicy::FullContext);
    session.set_pending_input("open the door").expect("input");
    let dispatch = session.begin_continue().expect("continue");
    session.settle_continue(dispatch.ticket, Ok("A stair led down.".into()));

    session.set_pending_input("go down").expect("input");
    let dispatch = session.begin_continue().expect("continue");
    assert_eq!(
        dispatch.request,
        OutboundRequest::Continue(ContinueStoryRequest {
            text: "go down".into(),
            context: Some("Once upon a time...\nA stair led down.".into()),
        })
    );
}

#[test]
fn failed_save_returns_to_active_with_content() {
    let mut session = active_session(ContinuationPolicy::InputOnly);
    let dispatch = session.begin_save().expect("save");
    assert_eq!(session.phase(), Phase::Saving);
    assert_eq!(
        dispatch.request,
        OutboundRequest::Save(SaveStoryRequest {
            genre: "Fantasy".into(),
            age: 10,
            choice_count: 2,
            page_count: 3,
            content: "Once upon a time...".into(),
        })
    );

    session.settle_save(
        dispatch.ticket,
        Err(RequestError::backend(500, "Failed to save story")),
    );
    assert_eq!(session.phase(), Phase::Active);
    assert_eq!(session.segments(), ["Once upon a time...".to_string()]);
    assert!(session.last_error().is_some());

    let again = session.begin_save().expect("save again");
    assert!(session.last_error().is_none());
    session.settle_save(again.ticket, Ok(SaveReceipt::default()));
    assert_eq!(session.phase(), Phase::Saved);
}

#[test]
fn saved_session_rejects_further_writes() {
    let mut session = active_session(ContinuationPolicy::InputOnly);
    let dispatch = session.begin_save().expect("save");
    session.settle_save(dispatch.ticket, Ok(SaveReceipt::default()));

    assert!(matches!(
        session.begin_save(),
        Err(SessionError::InvalidPhase {
            operation: Operation::Save,
            phase: Phase::Saved
        })
    ));
    assert!(matches!(
        session.set_pending_input("more"),
        Err(SessionError::InvalidPhase { .. })
    ));
    assert!(matches!(
        session.begin_continue(),
        Err(SessionError::InvalidPhase { .. })
    ));
    assert_eq!(session.segments().len(), 1);
}

#[test]
fn responses_after_close_are_discarded() {
    let mut session = active_session(ContinuationPolicy::InputOnly);
    session.set_pending_input("onwards").expect("input");
    let dispatch = session.begin_continue().expect("continue");
    session.close();

    let settled = session.settle_continue(dispatch.ticket, Ok("ignored".into()));
    assert_eq!(settled, Settlement::Discarded);
    assert_eq!(session.segments().len(), 1);
    assert_eq!(session.pending_input(), "onwards");
    assert_eq!(session.retry().expect_err("closed"), SessionError::Closed);
}

#[test]
fn stale_tickets_are_ignored() {
    let mut session = StorySession::new(ContinuationPolicy::InputOnly);
    let first = session.begin_start(fantasy()).expect("start");
    session.settle_start(first.ticket, Err(RequestError::transport("timeout")));
    let second = session.retry().expect("retry");

    assert_eq!(
        session.settle_start(first.ticket, Ok("late".into())),
        Settlement::Discarded
    );
    assert_eq!(session.phase(), Phase::Starting);

    assert_eq!(
        session.settle_continue(second.ticket, Ok("wrong kind".into())),
        Settlement::Discarded
    );
    assert_eq!(
        session.settle_start(second.ticket, Ok("fresh".into())),
        Settlement::Applied(Phase::Active)
    );
    assert_eq!(session.segments(), ["fresh".to_string()]);
}

#[test]
fn dismissing_errors() {
    let mut session = StorySession::new(ContinuationPolicy::InputOnly);
    let dispatch = session.begin_start(fantasy()).expect("start");
    session.settle_start(dispatch.ticket, Err(RequestError::decode("expected value")));
    assert_eq!(session.dismiss_error(), Ok(Phase::Idle));
    assert!(session.parameters().is_none());

    let mut session = active_session(ContinuationPolicy::InputOnly);
    session.set_pending_input("onwards").expect("input");
    let dispatch = session.begin_continue().expect("continue");
    session.settle_continue(dispatch.ticket, Err(backend_failure()));
    assert_eq!(session.dismiss_error(), Ok(Phase::Active));
    assert!(session.last_error().is_none());
    assert_eq!(session.segments().len(), 1);
    assert_eq!(session.pending_input(), "onwards");
}

#[test]
fn snapshot_reflects_state() {
    let mut session = active_session(ContinuationPolicy::InputOnly);
    session.set_pending_input("next").expect("input");
    let snapshot = session.snapshot();
    assert_eq!(snapshot.session_id, session.id());
    assert_eq!(snapshot.phase, Phase::Active);
    assert_eq!(snapshot.full_text(), "Once upon a time...");
    assert_eq!(snapshot.pending_input, "next");
    assert!(snapshot.receipt.is_none());
}

#[test]
fn continue_with_text_replaces_input_only_when_dispatched() {
    let mut session = active_session(ContinuationPolicy::InputOnly);
    session.set_pending_input("draft text").expect("input");

    assert_eq!(
        session.begin_continue_with("  ").expect_err("empty"),
        SessionError::EmptyInput
    );
    assert_eq!(session.pending_input(), "draft text");
    assert_eq!(session.phase(), Phase::Active);

    let dispatch = session.begin_continue_with("go left").expect("continue");
    assert_eq!(session.pending_input(), "go left");
    session.settle_continue(dispatch.ticket, Err(backend_failure()));

    let err = session.begin_continue_with("typed over").expect_err("failed phase");
    assert_eq!(
        err,
        SessionError::InvalidPhase {
            operation: Operation::Continue,
            phase: Phase::Failed
        }
    );
    assert_eq!(session.pending_input(), "go left");
    assert_eq!(session.phase(), Phase::Failed);
}

#[test]
fn busy_session_reports_phase_before_form_errors() {
    let mut session = StorySession::new(ContinuationPolicy::InputOnly);
    session.begin_start(fantasy()).expect("start");

    let err = session
        .begin_start_form(&StoryForm::default())
        .expect_err("busy");
    assert_eq!(
        err,
        SessionError::OperationInProgress {
            phase: Phase::Starting
        }
    );
    assert!(session.last_error().is_none());
}
