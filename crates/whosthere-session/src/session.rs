//! The session record and its in-place transitions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;
use whosthere_types::{MatchResult, SessionEvent, SessionStatus};

use crate::error::TrackerError;

/// What one completed voice-response cycle produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttemptOutcome {
    /// The answer was transcribed and scored.
    Scored(MatchResult),
    /// Nothing was heard, or the capture failed.
    NoAudio,
    /// Audio was captured but could not be transcribed.
    TranscriptionFailed,
}

/// One doorbell-press interaction.
///
/// Snapshots handed out by the tracker are plain clones; mutating one has
/// no effect on the stored session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub session_id: Uuid,
    pub device_id: String,
    pub status: SessionStatus,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub started_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    /// Score of the most recent comparison, if any answer was scored.
    pub last_score: Option<f64>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    deadline: Instant,
    #[serde(skip)]
    finished: Option<Instant>,
}

impl Session {
    pub(crate) fn new(
        device_id: &str,
        max_attempts: u32,
        ttl: Duration,
        now: Instant,
    ) -> Result<Self, TrackerError> {
        if max_attempts == 0 {
            return Err(TrackerError::InvalidLimits(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if ttl.is_zero() {
            return Err(TrackerError::InvalidLimits(
                "session ttl must be positive".to_string(),
            ));
        }

        let deadline = now.checked_add(ttl).ok_or_else(|| {
            TrackerError::InvalidLimits(format!("session ttl too large: {}s", ttl.as_secs()))
        })?;

        let started_at = Utc::now();
        let deadline_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|delta| started_at.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Ok(Self {
            session_id: Uuid::new_v4(),
            device_id: device_id.to_string(),
            status: SessionStatus::Pending,
            attempt_count: 0,
            max_attempts,
            started_at,
            deadline_at,
            last_score: None,
            finished_at: None,
            deadline,
            finished: None,
        })
    }

    /// Monotonic deadline for cooperative cancellation checks.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before `now` passes the deadline.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }

    /// Whether `now` is past the deadline.
    pub fn is_overdue_at(&self, now: Instant) -> bool {
        now > self.deadline
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt_count)
    }

    /// When the session reached a terminal status, on the monotonic clock.
    pub(crate) fn finished_instant(&self) -> Option<Instant> {
        self.finished
    }

    pub(crate) fn apply(&mut self, event: SessionEvent, now: Instant) -> Result<(), TrackerError> {
        let next = self.status.apply(event)?;
        self.set_status(next, now);
        Ok(())
    }

    /// Counts one answer and moves the status machine accordingly.
    ///
    /// Nothing is changed if the transition is refused.
    pub(crate) fn record_attempt(
        &mut self,
        outcome: AttemptOutcome,
        now: Instant,
    ) -> Result<(), TrackerError> {
        if self.attempt_count >= self.max_attempts {
            return Err(TrackerError::AttemptsExhausted {
                max_attempts: self.max_attempts,
            });
        }

        let count = self.attempt_count + 1;
        let event = match outcome {
            AttemptOutcome::Scored(result) if result.matched => SessionEvent::Matched,
            _ => SessionEvent::Missed {
                exhausted: count >= self.max_attempts,
            },
        };
        let next = self.status.apply(event)?;

        self.attempt_count = count;
        if let AttemptOutcome::Scored(result) = outcome {
            self.last_score = Some(result.score);
        }
        self.set_status(next, now);
        Ok(())
    }

    fn set_status(&mut self, next: SessionStatus, now: Instant) {
        self.status = next;
        if next.is_terminal() && self.finished.is_none() {
            self.finished = Some(now);
            self.finished_at = Some(Utc::now());
        }
    }
}
