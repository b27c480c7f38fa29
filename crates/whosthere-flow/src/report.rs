use serde::Serialize;
use uuid::Uuid;
use whosthere_types::VisitOutcome;

/// Why a visit ended without a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitReason {
    /// The device exceeded its doorbell event limit.
    RateLimited,
    /// No session could be created.
    SessionUnavailable,
    /// A prompt could not be played.
    PromptFailed,
    MaxAttemptsExceeded,
    DeadlineExceeded,
    /// The tracker refused an update mid-visit.
    TrackerFailure,
}

impl VisitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::SessionUnavailable => "session_unavailable",
            Self::PromptFailed => "prompt_failed",
            Self::MaxAttemptsExceeded => "max_attempts_exceeded",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::TrackerFailure => "tracker_failure",
        }
    }
}

impl std::fmt::Display for VisitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one doorbell visit, safe to log and return to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitReport {
    pub outcome: VisitOutcome,
    /// Absent when the event was rejected before a session existed.
    pub session_id: Option<Uuid>,
    pub device_id: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_score: Option<f64>,
    /// `None` for granted visits.
    pub reason: Option<VisitReason>,
    pub duration_ms: u64,
}
