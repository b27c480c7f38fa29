//! Concurrency tests for the session tracker.
//!
//! - Many tasks hammering one session never push `attempt_count` past
//!   `max_attempts`, and the session ends in exactly one terminal status.
//! - Sessions for different devices do not interfere.

use std::sync::Arc;
use std::time::Duration;

use whosthere_session::{AttemptOutcome, SessionTracker};
use whosthere_types::{MatchResult, SessionEvent, SessionStatus};

const TTL: Duration = Duration::from_secs(60);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_attempts_on_one_session_respect_the_limit() {
    let tracker = Arc::new(SessionTracker::default());
    let session = tracker.create("door-1", 3, TTL).unwrap();
    let id = session.session_id;
    tracker.apply(id, SessionEvent::Arm).unwrap();

    let mut handles = Vec::new();
    for _ in 0..64 {
        let tracker = tracker.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let recorded = tracker
                .record_attempt(id, AttemptOutcome::Scored(MatchResult::miss(5.0)))
                .is_ok();
            // Whoever lands in `retrying` re-arms; losers simply fail.
            let _ = tracker.apply(id, SessionEvent::Rearm);
            recorded
        }));
    }

    let mut recorded = 0;
    for handle in handles {
        if handle.await.expect("task should not panic") {
            recorded += 1;
        }
    }

    let session = tracker.get(id).unwrap();
    assert!(session.attempt_count <= session.max_attempts);
    assert_eq!(session.attempt_count, recorded);
    assert!(
        session.status == SessionStatus::Denied
            || session.status == SessionStatus::AwaitingResponse
            || session.status == SessionStatus::Retrying,
        "unexpected status {}",
        session.status
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sessions_for_different_devices_are_independent() {
    let tracker = Arc::new(SessionTracker::default());
    let devices: Vec<String> = (0..16).map(|i| format!("door-{i}")).collect();

    let mut handles = Vec::new();
    for (i, device) in devices.iter().cloned().enumerate() {
        let tracker = tracker.clone();
        handles.push(tokio::spawn(async move {
            let session = tracker.create(&device, 3, TTL).unwrap();
            let id = session.session_id;
            tracker.apply(id, SessionEvent::Arm).unwrap();

            // Device i misses (i % 3) times, then matches.
            for _ in 0..(i % 3) {
                tokio::task::yield_now().await;
                tracker
                    .record_attempt(id, AttemptOutcome::Scored(MatchResult::miss(20.0)))
                    .unwrap();
                tracker.apply(id, SessionEvent::Rearm).unwrap();
            }
            tracker
                .record_attempt(id, AttemptOutcome::Scored(MatchResult::hit(99.0, 0)))
                .unwrap();
            (id, i)
        }));
    }

    for handle in handles {
        let (id, i) = handle.await.unwrap();
        let session = tracker.get(id).unwrap();
        assert_eq!(session.device_id, format!("door-{i}"));
        assert_eq!(session.attempt_count as usize, i % 3 + 1);
        assert_eq!(session.status, SessionStatus::Matched);
        assert_eq!(session.last_score, Some(99.0));
    }
}
