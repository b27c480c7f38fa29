//! Shared types for the whosthere voice-gated intercom.
//!
//! This crate holds the vocabulary every other crate speaks: the session
//! status machine, the fixed set of spoken phrases, match results, and the
//! outcome of a visit. It has no I/O and no async code.
//!
//! Nothing in here ever carries passphrase text. A [`MatchResult`] refers to
//! a passphrase only by its index in the configured ordering.

mod phrase;
mod status;

pub use phrase::PhraseKey;
pub use status::{SessionEvent, SessionStatus, TransitionError};

use serde::{Deserialize, Serialize};

/// Result of comparing one transcript against the passphrase set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Whether the best score reached the configured threshold.
    pub matched: bool,
    /// Best similarity score in `[0, 100]`, reported even on a miss.
    pub score: f64,
    /// Index of the matching passphrase. Only set when `matched` is true.
    pub matched_phrase_index: Option<usize>,
}

impl MatchResult {
    /// A miss with the given best score.
    pub fn miss(score: f64) -> Self {
        Self {
            matched: false,
            score,
            matched_phrase_index: None,
        }
    }

    /// A hit on the passphrase at `index`.
    pub fn hit(score: f64, index: usize) -> Self {
        Self {
            matched: true,
            score,
            matched_phrase_index: Some(index),
        }
    }
}

/// Final outcome of a doorbell visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitOutcome {
    /// The visitor spoke a valid passphrase.
    Granted,
    /// Attempts ran out without a match.
    Denied,
    /// The session deadline passed before a decision.
    Expired,
    /// A collaborator or the tracker failed, or the event was rejected.
    Errored,
}

impl VisitOutcome {
    /// Returns the canonical string label for this outcome.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Expired => "expired",
            Self::Errored => "errored",
        }
    }
}

impl std::fmt::Display for VisitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_never_carries_an_index() {
        let result = MatchResult::miss(42.0);
        assert!(!result.matched);
        assert_eq!(result.matched_phrase_index, None);
    }

    #[test]
    fn outcome_serializes_snake_case() {
        let json = serde_json::to_string(&VisitOutcome::Granted).unwrap();
        assert_eq!(json, "\"granted\"");
        assert_eq!(VisitOutcome::Errored.to_string(), "errored");
    }
}
