#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use whosthere_flow::{Collaborators, FlowSettings, Orchestrator, RateLimitSettings};
use whosthere_matcher::PassphraseSet;
use whosthere_observe::MemoryTraceSink;
use whosthere_session::SessionTracker;
use async_trait::async_trait;
use whosthere_voice::fake::{Capture, RecordingSpeech, ScriptedTranscriber, ScriptedTransport};
use whosthere_voice::{AudioHandle, Transcriber, Transcript, VoiceError};

pub const PASSPHRASES: [&str; 2] = ["alohomora", "mellon"];
pub const WRONG: &str = "xyz completely different";

pub struct Harness {
    pub speech: Arc<RecordingSpeech>,
    pub transport: Arc<ScriptedTransport>,
    pub transcriber: Arc<ScriptedTranscriber>,
    pub trace: Arc<MemoryTraceSink>,
    pub tracker: Arc<SessionTracker>,
    pub orchestrator: Arc<Orchestrator>,
}

pub struct Builder {
    pub settings: FlowSettings,
    pub speech: RecordingSpeech,
    pub transport: ScriptedTransport,
    pub transcriber: ScriptedTranscriber,
    /// Replaces the scripted transcriber in the orchestrator.
    pub transcriber_override: Option<Arc<dyn Transcriber>>,
    pub tracker: SessionTracker,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            settings: test_settings(),
            speech: RecordingSpeech::new(),
            transport: ScriptedTransport::new(),
            transcriber: ScriptedTranscriber::new(),
            transcriber_override: None,
            tracker: SessionTracker::default(),
        }
    }
}

impl Builder {
    pub fn captures(mut self, captures: impl IntoIterator<Item = Capture>) -> Self {
        self.transport = ScriptedTransport::with_captures(captures);
        self
    }

    pub fn build(self) -> Harness {
        let speech = Arc::new(self.speech);
        let transport = Arc::new(self.transport);
        let transcriber = Arc::new(self.transcriber);
        let trace = Arc::new(MemoryTraceSink::new());
        let tracker = Arc::new(self.tracker);
        let passphrases = Arc::new(PassphraseSet::new(PASSPHRASES).expect("valid passphrases"));

        let orchestrator = Orchestrator::new(
            self.settings,
            passphrases,
            tracker.clone(),
            Collaborators {
                speech: speech.clone(),
                transport: transport.clone(),
                transcriber: self
                    .transcriber_override
                    .unwrap_or_else(|| transcriber.clone() as Arc<dyn Transcriber>),
                trace: trace.clone(),
            },
        )
        .expect("valid settings");

        Harness {
            speech,
            transport,
            transcriber,
            trace,
            tracker,
            orchestrator: Arc::new(orchestrator),
        }
    }
}

pub fn test_settings() -> FlowSettings {
    FlowSettings {
        threshold: 80.0,
        max_attempts: 3,
        recording_window: Duration::from_secs(5),
        session_deadline: Duration::from_secs(60),
        call_timeout: Duration::from_secs(10),
        rate_limit: RateLimitSettings {
            max_events: 100,
            window: Duration::from_secs(60),
        },
        ..FlowSettings::default()
    }
}

pub fn say(text: &str) -> Capture {
    Capture::speech(text)
}

/// Transcriber whose work moves the clock forward by `overrun` without
/// ever waiting on a timer, so it returns after the time has passed.
pub struct OverrunningTranscriber {
    pub text: &'static str,
    pub overrun: Duration,
}

#[async_trait]
impl Transcriber for OverrunningTranscriber {
    async fn transcribe(&self, _audio: &AudioHandle) -> Result<Transcript, VoiceError> {
        tokio::time::advance(self.overrun).await;
        Ok(Transcript::new(self.text))
    }
}
