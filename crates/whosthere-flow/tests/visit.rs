//! End-to-end visit tests against scripted collaborators.
//!
//! All tests run on tokio's paused clock, so recording windows, timeouts
//! and deadlines elapse instantly and deterministically.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{say, Builder, OverrunningTranscriber, WRONG};
use whosthere_flow::{CaptureFailurePolicy, FlowSettings, VisitReason};
use whosthere_observe::SpanOutcome;
use whosthere_types::{PhraseKey, SessionStatus, VisitOutcome};
use whosthere_voice::fake::{Capture, RecordingSpeech, Reply, ScriptedTranscriber};

use whosthere_types::PhraseKey::{Challenge, Denied, NoInputPrompt, RetryPrompt, Success, SystemError, WrongPassword};

// ── decisions ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn correct_answer_is_granted() {
    let h = Builder::default().captures([say("Alohomora")]).build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Granted);
    assert_eq!(report.reason, None);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.last_score, Some(100.0));
    assert_eq!(h.speech.phrases(), vec![Challenge, Success]);

    let session = h.tracker.get(report.session_id.unwrap()).unwrap();
    assert_eq!(session.status, SessionStatus::Matched);
}

#[tokio::test(start_paused = true)]
async fn close_enough_answer_is_granted() {
    let h = Builder::default().captures([say("alo mora")]).build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Granted);
    assert!(report.last_score.unwrap() >= 80.0);
}

#[tokio::test(start_paused = true)]
async fn three_wrong_answers_are_denied_after_three_attempts() {
    let h = Builder::default()
        .captures([say(WRONG), say(WRONG), say(WRONG)])
        .build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Denied);
    assert_eq!(report.reason, Some(VisitReason::MaxAttemptsExceeded));
    assert_eq!(report.attempts, 3);
    assert_eq!(report.max_attempts, 3);
    assert_eq!(h.transport.recordings_for("door-1"), 3);
    assert_eq!(
        h.speech.phrases(),
        vec![
            Challenge,
            WrongPassword,
            RetryPrompt,
            WrongPassword,
            RetryPrompt,
            Denied
        ]
    );

    let session = h.tracker.get(report.session_id.unwrap()).unwrap();
    assert_eq!(session.status, SessionStatus::Denied);
    assert_eq!(session.attempt_count, 3);
}

#[tokio::test(start_paused = true)]
async fn second_answer_can_still_succeed() {
    let h = Builder::default()
        .captures([say(WRONG), say("mellon")])
        .build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Granted);
    assert_eq!(report.attempts, 2);
    assert_eq!(
        h.speech.phrases(),
        vec![Challenge, WrongPassword, RetryPrompt, Success]
    );
}

// ── capture and transcription failures ───────────────────────────────

#[tokio::test(start_paused = true)]
async fn silence_consumes_an_attempt() {
    let h = Builder::default()
        .captures([Capture::Silence, say("alohomora")])
        .build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Granted);
    assert_eq!(report.attempts, 2);
    assert_eq!(h.speech.phrases(), vec![Challenge, NoInputPrompt, Success]);
}

#[tokio::test(start_paused = true)]
async fn transcription_failure_consumes_an_attempt() {
    let h = Builder {
        transcriber: ScriptedTranscriber::with_replies([Reply::Fail("decoder crashed".into())]),
        ..Builder::default()
    }
    .captures([say("alohomora"), say("alohomora")])
    .build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Granted);
    assert_eq!(report.attempts, 2);
    assert_eq!(h.transcriber.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn capture_errors_alone_end_in_denial() {
    let h = Builder::default()
        .captures([
            Capture::Silence,
            Capture::Fail("mic unplugged".into()),
            Capture::Silence,
        ])
        .build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Denied);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.last_score, None, "nothing was ever scored");
    assert_eq!(
        h.speech.phrases(),
        vec![Challenge, NoInputPrompt, NoInputPrompt, Denied]
    );
}

#[tokio::test(start_paused = true)]
async fn free_repeat_policy_does_not_count_failures() {
    let h = Builder {
        settings: FlowSettings {
            capture_failure_policy: CaptureFailurePolicy::FreeRepeat {
                max_free_repeats: 2,
            },
            ..common::test_settings()
        },
        ..Builder::default()
    }
    .captures([Capture::Silence, Capture::Silence, say("alohomora")])
    .build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Granted);
    assert_eq!(report.attempts, 1);
    assert_eq!(
        h.speech.phrases(),
        vec![Challenge, NoInputPrompt, NoInputPrompt, Success]
    );
}

#[tokio::test(start_paused = true)]
async fn free_repeats_are_bounded() {
    let h = Builder {
        settings: FlowSettings {
            capture_failure_policy: CaptureFailurePolicy::FreeRepeat {
                max_free_repeats: 1,
            },
            ..common::test_settings()
        },
        ..Builder::default()
    }
    .build();

    // Unscripted transport is silent forever.
    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Denied);
    assert_eq!(report.attempts, 3);
    assert_eq!(h.transport.recordings_for("door-1"), 4);
}

#[tokio::test(start_paused = true)]
async fn hanging_capture_times_out_and_counts() {
    let h = Builder::default()
        .captures([Capture::Hang, say("alohomora")])
        .build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Granted);
    assert_eq!(report.attempts, 2);

    let captures = h.trace.finished("capture");
    assert_eq!(captures[0].outcome, Some(SpanOutcome::Timeout));
    assert_eq!(captures[1].outcome, Some(SpanOutcome::Ok));
}

// ── playback failures ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn challenge_failure_errors_without_listening() {
    let h = Builder {
        speech: RecordingSpeech::new().fail_on(Challenge),
        ..Builder::default()
    }
    .captures([say("alohomora")])
    .build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Errored);
    assert_eq!(report.reason, Some(VisitReason::PromptFailed));
    assert_eq!(report.attempts, 0);
    assert_eq!(h.transport.recordings_for("door-1"), 0);
    assert_eq!(h.speech.phrases(), vec![Challenge, SystemError]);

    let session = h.tracker.get(report.session_id.unwrap()).unwrap();
    assert_eq!(session.status, SessionStatus::Errored);
}

#[tokio::test(start_paused = true)]
async fn hanging_challenge_times_out_into_error() {
    let h = Builder {
        speech: RecordingSpeech::new().hang_on(Challenge),
        ..Builder::default()
    }
    .build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Errored);
    assert_eq!(report.reason, Some(VisitReason::PromptFailed));
    assert_eq!(
        h.trace.finished("prompt")[0].outcome,
        Some(SpanOutcome::Timeout)
    );
}

#[tokio::test(start_paused = true)]
async fn retry_prompt_failure_errors() {
    let h = Builder {
        speech: RecordingSpeech::new().fail_on(RetryPrompt),
        ..Builder::default()
    }
    .captures([say(WRONG), say("alohomora")])
    .build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Errored);
    assert_eq!(report.attempts, 1);
    assert_eq!(h.transport.recordings_for("door-1"), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_welcome_keeps_the_grant() {
    let h = Builder {
        speech: RecordingSpeech::new().fail_on(Success),
        ..Builder::default()
    }
    .captures([say("alohomora")])
    .build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Granted);
    assert_eq!(
        h.trace.finished("farewell")[0].outcome,
        Some(SpanOutcome::Error)
    );
}

// ── deadline ─────────────────────────────────────────────────────────

fn short_deadline() -> FlowSettings {
    FlowSettings {
        recording_window: Duration::from_secs(2),
        call_timeout: Duration::from_secs(5),
        session_deadline: Duration::from_secs(4),
        ..common::test_settings()
    }
}

#[tokio::test(start_paused = true)]
async fn deadline_expires_a_hanging_capture() {
    let h = Builder {
        settings: short_deadline(),
        ..Builder::default()
    }
    .captures([Capture::Hang])
    .build();

    let started = tokio::time::Instant::now();
    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Expired);
    assert_eq!(report.reason, Some(VisitReason::DeadlineExceeded));
    assert_eq!(report.attempts, 0);
    assert!(started.elapsed() <= Duration::from_secs(4));

    let session = h.tracker.get(report.session_id.unwrap()).unwrap();
    assert_eq!(session.status, SessionStatus::Expired);

    // The timeout message is played in the background.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.speech.phrases().last(), Some(&PhraseKey::Timeout));
}

#[tokio::test(start_paused = true)]
async fn deadline_wins_over_remaining_attempts() {
    let h = Builder {
        settings: short_deadline(),
        transcriber: ScriptedTranscriber::new().with_latency(Duration::from_millis(1500)),
        ..Builder::default()
    }
    .captures([say(WRONG), say(WRONG), say(WRONG)])
    .build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Expired);
    assert!(report.attempts < 3);
}

#[tokio::test(start_paused = true)]
async fn expiry_does_not_wait_for_the_timeout_message() {
    let h = Builder {
        settings: short_deadline(),
        speech: RecordingSpeech::new().hang_on(PhraseKey::Timeout),
        ..Builder::default()
    }
    .captures([Capture::Hang])
    .build();

    let started = tokio::time::Instant::now();
    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Expired);
    assert!(started.elapsed() <= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn answer_scored_after_the_deadline_keeps_its_decision() {
    let h = Builder {
        settings: short_deadline(),
        transcriber_override: Some(Arc::new(OverrunningTranscriber {
            text: "alohomora",
            overrun: Duration::from_secs(5),
        })),
        ..Builder::default()
    }
    .captures([say("alohomora")])
    .build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let session = h.tracker.get(report.session_id.unwrap()).unwrap();
    assert_eq!(session.status, SessionStatus::Matched);
    assert_eq!(report.outcome, VisitOutcome::Granted);
    assert_eq!(report.reason, None);
    assert_eq!(report.attempts, 1);
    assert_eq!(h.speech.phrases(), vec![Challenge, Success]);
}

// ── admission ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn rate_limited_events_touch_no_collaborator() {
    let h = Builder {
        settings: FlowSettings {
            rate_limit: whosthere_flow::RateLimitSettings {
                max_events: 1,
                window: Duration::from_secs(60),
            },
            ..common::test_settings()
        },
        ..Builder::default()
    }
    .captures([say("alohomora"), say("alohomora")])
    .build();

    let first = h.orchestrator.handle_doorbell_event("door-1").await;
    assert_eq!(first.outcome, VisitOutcome::Granted);
    let spoken = h.speech.phrases().len();

    let second = h.orchestrator.handle_doorbell_event("door-1").await;
    assert_eq!(second.outcome, VisitOutcome::Errored);
    assert_eq!(second.reason, Some(VisitReason::RateLimited));
    assert_eq!(second.session_id, None);
    assert_eq!(h.speech.phrases().len(), spoken);
    assert_eq!(h.transport.recordings_for("door-1"), 1);

    let other = h.orchestrator.handle_doorbell_event("door-2").await;
    assert_eq!(other.outcome, VisitOutcome::Granted);
}

#[tokio::test(start_paused = true)]
async fn full_tracker_is_a_session_error() {
    let tracker = whosthere_session::SessionTracker::new(1);
    tracker
        .create("door-9", 3, Duration::from_secs(60))
        .expect("first session fits");

    let h = Builder {
        tracker,
        ..Builder::default()
    }
    .build();

    let report = h.orchestrator.handle_doorbell_event("door-1").await;

    assert_eq!(report.outcome, VisitOutcome::Errored);
    assert_eq!(report.reason, Some(VisitReason::SessionUnavailable));
    assert_eq!(report.session_id, None);
    assert_eq!(h.speech.phrases(), vec![SystemError]);
}

#[test]
fn invalid_settings_are_rejected_up_front() {
    let trace = std::sync::Arc::new(whosthere_observe::MemoryTraceSink::new());
    let passphrases = whosthere_matcher::PassphraseSet::new(common::PASSPHRASES).unwrap();
    let result = whosthere_flow::Orchestrator::new(
        FlowSettings {
            max_attempts: 0,
            ..common::test_settings()
        },
        std::sync::Arc::new(passphrases),
        std::sync::Arc::new(whosthere_session::SessionTracker::default()),
        whosthere_flow::Collaborators {
            speech: std::sync::Arc::new(RecordingSpeech::new()),
            transport: std::sync::Arc::new(whosthere_voice::fake::ScriptedTransport::new()),
            transcriber: std::sync::Arc::new(ScriptedTranscriber::new()),
            trace,
        },
    );

    assert!(matches!(
        result,
        Err(whosthere_flow::FlowError::Configuration(_))
    ));
}
