use thiserror::Error;
use uuid::Uuid;
use whosthere_types::TransitionError;

/// Errors returned by [`crate::SessionTracker`] operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// No session with this ID (never created, or already evicted).
    #[error("session not found: {0}")]
    NotFound(Uuid),

    /// The store already holds the maximum number of live sessions.
    #[error("session store is full ({limit} live sessions)")]
    Capacity {
        /// Configured maximum.
        limit: usize,
    },

    /// `max_attempts` or the TTL cannot produce a valid session.
    #[error("invalid session limits: {0}")]
    InvalidLimits(String),

    /// Every allowed attempt has already been recorded.
    #[error("all {max_attempts} attempts already recorded")]
    AttemptsExhausted {
        /// The session's attempt limit.
        max_attempts: u32,
    },

    /// The status machine refused the transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),
}
