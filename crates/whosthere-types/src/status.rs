//! Session status machine.
//!
//! A session moves monotonically:
//!
//! ```text
//! pending -> awaiting_response -> matched
//!                              -> retrying -> awaiting_response
//!                              -> denied
//! (any non-terminal)           -> expired | errored
//! ```
//!
//! [`SessionStatus::apply`] is the single place where transitions are
//! decided. Everything else asks it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of a single doorbell session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, challenge not yet armed.
    Pending,
    /// Waiting for the visitor's spoken answer.
    AwaitingResponse,
    /// A passphrase matched. Terminal.
    Matched,
    /// Last answer missed; another attempt is allowed.
    Retrying,
    /// Attempts exhausted without a match. Terminal.
    Denied,
    /// A collaborator failed in a non-retryable step. Terminal.
    Errored,
    /// The deadline passed. Terminal.
    Expired,
}

/// Inputs to the status machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    /// The challenge is about to be played; start listening.
    Arm,
    /// The recorded answer matched.
    Matched,
    /// The recorded answer missed (or could not be captured/transcribed).
    Missed {
        /// Whether that was the last allowed attempt.
        exhausted: bool,
    },
    /// The retry prompt was played; listen again.
    Rearm,
    /// A non-retryable collaborator failure.
    Fail,
    /// The deadline passed.
    Expire,
}

/// A transition the status machine refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The session already reached a terminal status.
    #[error("session is terminal ({from}); cannot apply {event:?}")]
    Terminal {
        from: SessionStatus,
        event: SessionEvent,
    },

    /// The event is not valid from this status.
    #[error("invalid transition from {from} on {event:?}")]
    Invalid {
        from: SessionStatus,
        event: SessionEvent,
    },
}

impl SessionStatus {
    /// Returns the canonical string label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingResponse => "awaiting_response",
            Self::Matched => "matched",
            Self::Retrying => "retrying",
            Self::Denied => "denied",
            Self::Errored => "errored",
            Self::Expired => "expired",
        }
    }

    /// Whether no further transition can occur from this status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Matched | Self::Denied | Self::Errored | Self::Expired
        )
    }

    /// Computes the next status for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Terminal`] if `self` is terminal and
    /// [`TransitionError::Invalid`] for any other disallowed pair.
    pub fn apply(self, event: SessionEvent) -> Result<SessionStatus, TransitionError> {
        use SessionEvent as E;
        use SessionStatus as S;

        if self.is_terminal() {
            return Err(TransitionError::Terminal { from: self, event });
        }

        match (self, event) {
            (S::Pending, E::Arm) => Ok(S::AwaitingResponse),
            (S::AwaitingResponse, E::Matched) => Ok(S::Matched),
            (S::AwaitingResponse, E::Missed { exhausted: false }) => Ok(S::Retrying),
            (S::AwaitingResponse, E::Missed { exhausted: true }) => Ok(S::Denied),
            (S::Retrying, E::Rearm) => Ok(S::AwaitingResponse),
            (_, E::Fail) => Ok(S::Errored),
            (_, E::Expire) => Ok(S::Expired),
            (from, event) => Err(TransitionError::Invalid { from, event }),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
