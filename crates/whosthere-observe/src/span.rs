//! Span identity, metadata, outcome, and record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque reference to an open span, returned by `start_span`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanHandle {
    id: Uuid,
    name: String,
}

impl SpanHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Who a span is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanMetadata {
    /// Absent for spans opened before a session exists.
    pub session_id: Option<Uuid>,
    pub device_id: String,
    /// 1-based attempt number the step belongs to, when relevant.
    pub attempt: Option<u32>,
}

impl SpanMetadata {
    pub fn for_device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }
}

/// How a span ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanOutcome {
    Ok,
    Error,
    /// The collaborator call ran past its own timeout.
    Timeout,
    /// The session deadline passed during the step.
    Expired,
    /// The span was dropped without being ended.
    Abandoned,
}

impl SpanOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Expired => "expired",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for SpanOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SpanOutcome {
    type Err = ParseSpanOutcomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "error" => Ok(Self::Error),
            "timeout" => Ok(Self::Timeout),
            "expired" => Ok(Self::Expired),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(ParseSpanOutcomeError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown span outcome string.
#[derive(Debug, Clone)]
pub struct ParseSpanOutcomeError(pub String);

impl std::fmt::Display for ParseSpanOutcomeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown span outcome: {}", self.0)
    }
}

impl std::error::Error for ParseSpanOutcomeError {}

/// Measurements attached to a finished span.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanMetrics {
    pub latency_ms: u64,
    /// Similarity score of a comparison, 0 to 100.
    pub score: Option<f64>,
    /// Index of the matched passphrase. Never the phrase itself.
    pub matched_index: Option<usize>,
    /// Length of a transcript in characters.
    pub transcript_chars: Option<usize>,
    /// Short failure description, e.g. an error kind or phrase key.
    pub detail: Option<String>,
}

impl SpanMetrics {
    pub fn with_latency(latency_ms: u64) -> Self {
        Self {
            latency_ms,
            ..Self::default()
        }
    }
}

/// A span as stored by a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub span_id: Uuid,
    pub name: String,
    pub metadata: SpanMetadata,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// `None` while the span is open.
    pub outcome: Option<SpanOutcome>,
    pub metrics: SpanMetrics,
}

impl SpanRecord {
    pub(crate) fn open(handle: &SpanHandle, metadata: &SpanMetadata) -> Self {
        Self {
            span_id: handle.id(),
            name: handle.name().to_string(),
            metadata: metadata.clone(),
            started_at: Utc::now(),
            ended_at: None,
            outcome: None,
            metrics: SpanMetrics::default(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.outcome.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_round_trips_through_str() {
        for outcome in [
            SpanOutcome::Ok,
            SpanOutcome::Error,
            SpanOutcome::Timeout,
            SpanOutcome::Expired,
            SpanOutcome::Abandoned,
        ] {
            assert_eq!(outcome.as_str().parse::<SpanOutcome>().unwrap(), outcome);
        }
        assert!("finished".parse::<SpanOutcome>().is_err());
    }

    #[test]
    fn handles_are_unique() {
        assert_ne!(SpanHandle::new("capture").id(), SpanHandle::new("capture").id());
    }
}
