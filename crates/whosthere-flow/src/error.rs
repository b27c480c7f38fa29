use thiserror::Error;
use uuid::Uuid;
use whosthere_session::TrackerError;

/// Failures the orchestrator deals with while running a visit.
///
/// None of these escape `handle_doorbell_event`; they are folded into the
/// visit report. Messages name steps and collaborators, never secrets.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The tracker could not open a session for the visit.
    #[error("could not create session: {0}")]
    SessionCreation(#[source] TrackerError),

    /// A collaborator call ran past its timeout.
    #[error("{step} timed out after {after_ms} ms")]
    CollaboratorTimeout { step: &'static str, after_ms: u64 },

    /// A collaborator call failed.
    #[error("{step} failed: {message}")]
    CollaboratorUnavailable { step: &'static str, message: String },

    /// The recording window passed without speech.
    #[error("no audio detected")]
    NoAudio,

    /// The session deadline passed.
    #[error("session {0} expired")]
    SessionExpired(Uuid),

    /// Settings that cannot drive a visit.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The tracker refused an update mid-visit.
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

impl FlowError {
    /// Short label for traces and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionCreation(_) => "session_creation",
            Self::CollaboratorTimeout { .. } => "collaborator_timeout",
            Self::CollaboratorUnavailable { .. } => "collaborator_unavailable",
            Self::NoAudio => "no_audio",
            Self::SessionExpired(_) => "session_expired",
            Self::Configuration(_) => "configuration",
            Self::Tracker(_) => "tracker",
        }
    }
}
