//! In-memory keyed session store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;
use whosthere_types::SessionEvent;

use crate::error::TrackerError;
use crate::session::{AttemptOutcome, Session};

/// Default bound on concurrently stored sessions.
pub const DEFAULT_MAX_LIVE_SESSIONS: usize = 1024;

/// Keyed store of [`Session`]s.
///
/// Uses `std::sync` locks: every acquisition is a short map or field
/// operation that never spans an `.await`.
#[derive(Debug)]
pub struct SessionTracker {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
    max_live_sessions: usize,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LIVE_SESSIONS)
    }
}

impl SessionTracker {
    pub fn new(max_live_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_live_sessions,
        }
    }

    /// Creates a `pending` session for `device_id`.
    ///
    /// When the store is full, terminal sessions are evicted first; if that
    /// frees nothing the call fails with [`TrackerError::Capacity`].
    pub fn create(
        &self,
        device_id: &str,
        max_attempts: u32,
        ttl: Duration,
    ) -> Result<Session, TrackerError> {
        let session = Session::new(device_id, max_attempts, ttl, Instant::now())?;

        if self.len() >= self.max_live_sessions {
            let evicted = self.evict_terminal(Duration::ZERO);
            tracing::debug!(evicted, "session store full, evicted terminal sessions");
        }

        let mut sessions = self.write_map();
        if sessions.len() >= self.max_live_sessions {
            tracing::warn!(
                limit = self.max_live_sessions,
                device_id,
                "refusing new session, store is full"
            );
            return Err(TrackerError::Capacity {
                limit: self.max_live_sessions,
            });
        }
        sessions.insert(session.session_id, Arc::new(Mutex::new(session.clone())));

        tracing::debug!(session_id = %session.session_id, device_id, "session created");
        Ok(session)
    }

    /// Returns a snapshot of the session.
    pub fn get(&self, session_id: Uuid) -> Result<Session, TrackerError> {
        let entry = self.entry(session_id)?;
        let session = lock_session(&entry);
        Ok(session.clone())
    }

    /// Applies a non-attempt event (`Arm`, `Rearm`, `Fail`, `Expire`).
    pub fn apply(&self, session_id: Uuid, event: SessionEvent) -> Result<Session, TrackerError> {
        let entry = self.entry(session_id)?;
        let mut session = lock_session(&entry);
        let from = session.status;
        session.apply(event, Instant::now())?;
        tracing::debug!(%session_id, %from, to = %session.status, "session transition");
        Ok(session.clone())
    }

    /// Counts one answer and updates the status.
    ///
    /// A match moves to `matched`; a miss moves to `retrying`, or to
    /// `denied` when it was the last allowed attempt.
    pub fn record_attempt(
        &self,
        session_id: Uuid,
        outcome: AttemptOutcome,
    ) -> Result<Session, TrackerError> {
        let entry = self.entry(session_id)?;
        let mut session = lock_session(&entry);
        session.record_attempt(outcome, Instant::now())?;
        tracing::debug!(
            %session_id,
            attempt = session.attempt_count,
            max_attempts = session.max_attempts,
            status = %session.status,
            "attempt recorded"
        );
        Ok(session.clone())
    }

    /// Moves the session to `expired` if it is past its deadline and not
    /// yet terminal. Returns the (possibly unchanged) snapshot.
    pub fn expire_if_overdue(&self, session_id: Uuid) -> Result<Session, TrackerError> {
        let entry = self.entry(session_id)?;
        let mut session = lock_session(&entry);
        let now = Instant::now();
        if !session.is_terminal() && session.is_overdue_at(now) {
            session.apply(SessionEvent::Expire, now)?;
            tracing::info!(%session_id, "session expired");
        }
        Ok(session.clone())
    }

    /// Expires every overdue non-terminal session. Returns how many.
    pub fn expire_overdue(&self) -> usize {
        let entries: Vec<_> = self.read_map().values().cloned().collect();
        let now = Instant::now();

        entries
            .iter()
            .filter(|entry| {
                let mut session = lock_session(entry);
                !session.is_terminal()
                    && session.is_overdue_at(now)
                    && session.apply(SessionEvent::Expire, now).is_ok()
            })
            .count()
    }

    /// Removes terminal sessions that finished more than `retention` ago.
    pub fn evict_terminal(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.write_map();
        let before = sessions.len();

        sessions.retain(|_, entry| {
            let session = lock_session(entry);
            match session.finished_instant() {
                Some(finished) => now.saturating_duration_since(finished) < retention,
                None => true,
            }
        });

        before - sessions.len()
    }

    /// Number of stored sessions, terminal or not.
    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, session_id: Uuid) -> Result<Arc<Mutex<Session>>, TrackerError> {
        self.read_map()
            .get(&session_id)
            .cloned()
            .ok_or(TrackerError::NotFound(session_id))
    }

    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Arc<Mutex<Session>>>> {
        self.sessions.read().unwrap_or_else(|poisoned| {
            tracing::error!("session map lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Arc<Mutex<Session>>>> {
        self.sessions.write().unwrap_or_else(|poisoned| {
            tracing::error!("session map lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// A panic while holding a session lock leaves the session in whatever
/// state the last completed transition produced, so the guard is reused.
fn lock_session(entry: &Mutex<Session>) -> MutexGuard<'_, Session> {
    entry.lock().unwrap_or_else(|poisoned| {
        tracing::error!("session lock poisoned, recovering");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use whosthere_types::{MatchResult, SessionStatus};

    const TTL: Duration = Duration::from_secs(30);

    fn armed(tracker: &SessionTracker, device_id: &str, max_attempts: u32) -> Uuid {
        let session = tracker.create(device_id, max_attempts, TTL).unwrap();
        tracker.apply(session.session_id, SessionEvent::Arm).unwrap();
        session.session_id
    }

    #[test]
    fn create_then_get_round_trips() {
        let tracker = SessionTracker::default();
        let created = tracker.create("door-1", 3, TTL).unwrap();
        let fetched = tracker.get(created.session_id).unwrap();
        assert_eq!(fetched.session_id, created.session_id);
        assert_eq!(fetched.device_id, "door-1");
        assert_eq!(fetched.status, SessionStatus::Pending);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let tracker = SessionTracker::default();
        let id = Uuid::new_v4();
        assert!(matches!(tracker.get(id), Err(TrackerError::NotFound(got)) if got == id));
    }

    #[test]
    fn snapshots_are_detached() {
        let tracker = SessionTracker::default();
        let mut snapshot = tracker.create("door-1", 3, TTL).unwrap();
        snapshot.attempt_count = 99;
        assert_eq!(tracker.get(snapshot.session_id).unwrap().attempt_count, 0);
    }

    #[test]
    fn three_misses_deny() {
        let tracker = SessionTracker::default();
        let id = armed(&tracker, "door-1", 3);

        for attempt in 1..=3 {
            let session = tracker
                .record_attempt(id, AttemptOutcome::Scored(MatchResult::miss(10.0)))
                .unwrap();
            assert_eq!(session.attempt_count, attempt);
            if attempt < 3 {
                assert_eq!(session.status, SessionStatus::Retrying);
                tracker.apply(id, SessionEvent::Rearm).unwrap();
            } else {
                assert_eq!(session.status, SessionStatus::Denied);
            }
        }

        let err = tracker
            .record_attempt(id, AttemptOutcome::NoAudio)
            .unwrap_err();
        assert!(matches!(err, TrackerError::AttemptsExhausted { max_attempts: 3 }));
        assert_eq!(tracker.get(id).unwrap().attempt_count, 3);
    }

    #[test]
    fn terminal_session_ignores_further_events() {
        let tracker = SessionTracker::default();
        let id = armed(&tracker, "door-1", 3);
        tracker.apply(id, SessionEvent::Fail).unwrap();

        assert!(tracker.apply(id, SessionEvent::Expire).is_err());
        assert!(tracker.record_attempt(id, AttemptOutcome::NoAudio).is_err());
        assert_eq!(tracker.get(id).unwrap().status, SessionStatus::Errored);
    }

    #[test]
    fn capacity_is_enforced() {
        let tracker = SessionTracker::new(1);
        tracker.create("door-1", 3, TTL).unwrap();
        let err = tracker.create("door-2", 3, TTL).unwrap_err();
        assert!(matches!(err, TrackerError::Capacity { limit: 1 }));
    }

    #[test]
    fn full_store_evicts_terminal_sessions_first() {
        let tracker = SessionTracker::new(1);
        let id = armed(&tracker, "door-1", 3);
        tracker.apply(id, SessionEvent::Fail).unwrap();

        let fresh = tracker.create("door-2", 3, TTL).unwrap();
        assert_eq!(tracker.len(), 1);
        assert!(tracker.get(fresh.session_id).is_ok());
        assert!(matches!(tracker.get(id), Err(TrackerError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn expire_if_overdue_only_after_deadline() {
        let tracker = SessionTracker::default();
        let id = armed(&tracker, "door-1", 3);

        tokio::time::advance(TTL).await;
        assert_eq!(
            tracker.expire_if_overdue(id).unwrap().status,
            SessionStatus::AwaitingResponse,
            "exactly at the deadline is not overdue"
        );

        tokio::time::advance(Duration::from_millis(1)).await;
        let session = tracker.expire_if_overdue(id).unwrap();
        assert_eq!(session.status, SessionStatus::Expired);
        assert!(session.finished_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn expire_if_overdue_leaves_terminal_alone() {
        let tracker = SessionTracker::default();
        let id = armed(&tracker, "door-1", 3);
        tracker
            .record_attempt(id, AttemptOutcome::Scored(MatchResult::hit(100.0, 0)))
            .unwrap();

        tokio::time::advance(TTL * 2).await;
        assert_eq!(
            tracker.expire_if_overdue(id).unwrap().status,
            SessionStatus::Matched
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_expires_then_evicts_after_retention() {
        let tracker = SessionTracker::default();
        let stale = armed(&tracker, "door-1", 3);
        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        let live = armed(&tracker, "door-2", 3);

        assert_eq!(tracker.expire_overdue(), 1);
        assert_eq!(tracker.get(stale).unwrap().status, SessionStatus::Expired);
        assert_eq!(tracker.get(live).unwrap().status, SessionStatus::AwaitingResponse);

        let retention = Duration::from_secs(60);
        assert_eq!(tracker.evict_terminal(retention), 0);

        tokio::time::advance(retention).await;
        assert_eq!(tracker.evict_terminal(retention), 1);
        assert!(tracker.get(stale).is_err());
        assert!(tracker.get(live).is_ok(), "non-terminal sessions are never evicted");
    }
}
