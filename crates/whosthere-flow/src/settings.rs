//! Immutable per-deployment settings for the orchestrator.

use std::time::Duration;

use crate::error::FlowError;

/// What a failed capture or transcription costs the visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureFailurePolicy {
    /// Every failure uses up one attempt.
    #[default]
    ConsumesAttempt,
    /// The first `max_free_repeats` failures of a visit are re-prompted
    /// without counting; later ones consume attempts.
    FreeRepeat { max_free_repeats: u32 },
}

/// Fixed-window limit on doorbell events per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub max_events: u32,
    pub window: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_events: 5,
            window: Duration::from_secs(60),
        }
    }
}

/// Everything the orchestrator needs besides the passphrases themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSettings {
    /// Minimum similarity score, 0 to 100, that counts as a match.
    pub threshold: f64,
    pub max_attempts: u32,
    /// Length of each answer recording.
    pub recording_window: Duration,
    /// Time from doorbell press until the visit must be decided.
    pub session_deadline: Duration,
    /// Upper bound for any single collaborator call.
    pub call_timeout: Duration,
    pub capture_failure_policy: CaptureFailurePolicy,
    pub rate_limit: RateLimitSettings,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            threshold: 80.0,
            max_attempts: 3,
            recording_window: Duration::from_secs(5),
            session_deadline: Duration::from_secs(60),
            call_timeout: Duration::from_secs(15),
            capture_failure_policy: CaptureFailurePolicy::default(),
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl FlowSettings {
    pub fn validate(&self) -> Result<(), FlowError> {
        if !(0.0..=100.0).contains(&self.threshold) {
            return Err(FlowError::Configuration(format!(
                "threshold must be between 0 and 100, got {}",
                self.threshold
            )));
        }
        if self.max_attempts == 0 {
            return Err(FlowError::Configuration(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.recording_window.is_zero() || self.session_deadline.is_zero() {
            return Err(FlowError::Configuration(
                "recording window and session deadline must be positive".to_string(),
            ));
        }
        if self.recording_window > self.session_deadline {
            return Err(FlowError::Configuration(
                "recording window must not exceed the session deadline".to_string(),
            ));
        }
        // The capture call includes the recording window itself.
        if self.call_timeout <= self.recording_window {
            return Err(FlowError::Configuration(
                "call timeout must be longer than the recording window".to_string(),
            ));
        }
        if self.rate_limit.window.is_zero() {
            return Err(FlowError::Configuration(
                "rate limit window must be positive".to_string(),
            ));
        }
        if self.rate_limit.max_events == 0 {
            return Err(FlowError::Configuration(
                "rate limit must allow at least one event per window".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        FlowSettings::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let settings = FlowSettings {
            threshold: 100.5,
            ..FlowSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(FlowError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_recording_longer_than_call_timeout() {
        let settings = FlowSettings {
            recording_window: Duration::from_secs(20),
            call_timeout: Duration::from_secs(10),
            ..FlowSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_a_rate_limit_that_admits_nothing() {
        let settings = FlowSettings {
            rate_limit: RateLimitSettings {
                max_events: 0,
                ..FlowSettings::default().rate_limit
            },
            ..FlowSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(FlowError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_zero_attempts() {
        let settings = FlowSettings {
            max_attempts: 0,
            ..FlowSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
