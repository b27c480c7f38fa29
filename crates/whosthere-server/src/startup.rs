//! Assembles collaborators and the orchestrator from configuration.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use whosthere_flow::{Collaborators, FlowError, Orchestrator};
use whosthere_observe::{FanoutTraceSink, LogTraceSink, SqliteTraceSink, TraceError, TraceSink};
use whosthere_session::SessionTracker;
use whosthere_voice::{
    DoorbellTransport, FixedTranscriber, PrerenderedSpeech, SimulatedIntercom, Transcriber,
    WhisperTranscriber,
};

use crate::config::{Config, ConfigError};
use crate::AppState;

/// Failures that keep the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open trace store: {0}")]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

/// Everything the binary needs after startup.
pub struct Services {
    pub state: AppState,
    /// Kept for the clip check at startup.
    pub speech: Arc<PrerenderedSpeech>,
}

/// Validates `config` and builds the running services.
pub fn build_services(config: &Config) -> Result<Services, StartupError> {
    config.validate()?;

    let transport: Arc<dyn DoorbellTransport> = Arc::new(SimulatedIntercom::new(
        config.collaborators.sample_recording.clone(),
    ));
    let speech = Arc::new(PrerenderedSpeech::new(
        &config.collaborators.audio_dir,
        transport.clone(),
    ));
    let transcriber = build_transcriber(config);
    let trace = build_trace_sink(config)?;

    let tracker = Arc::new(SessionTracker::new(config.session.max_live_sessions));
    let orchestrator = Orchestrator::new(
        config.flow_settings(),
        Arc::new(config.passphrase_set()?),
        tracker,
        Collaborators {
            speech: speech.clone(),
            transport,
            transcriber,
            trace,
        },
    )?;

    tracing::info!(
        settings = ?orchestrator.settings(),
        passphrases = orchestrator.passphrases().len(),
        "orchestrator ready"
    );

    Ok(Services {
        state: AppState::new(Arc::new(orchestrator)),
        speech,
    })
}

fn build_transcriber(config: &Config) -> Arc<dyn Transcriber> {
    let collaborators = &config.collaborators;
    match (&collaborators.stt_binary, &collaborators.stt_model) {
        (Some(binary), Some(model)) => {
            tracing::info!(binary = %binary.display(), model = %model.display(), "using whisper transcriber");
            Arc::new(
                WhisperTranscriber::new(model, binary)
                    .with_language(collaborators.stt_language.clone())
                    .with_timeout(Duration::from_secs(collaborators.call_timeout_seconds)),
            )
        }
        _ => {
            tracing::warn!("no STT binary configured, every answer transcribes to the fixed text");
            Arc::new(FixedTranscriber::new(collaborators.stt_fixed_text.clone()))
        }
    }
}

fn build_trace_sink(config: &Config) -> Result<Arc<dyn TraceSink>, StartupError> {
    let Some(db_path) = &config.trace.db_path else {
        return Ok(Arc::new(LogTraceSink));
    };

    let store = SqliteTraceSink::open(db_path, config.db_runtime_settings())?;
    tracing::info!(path = %db_path, "trace spans stored in sqlite");
    let sinks: Vec<Arc<dyn TraceSink>> = vec![Arc::new(LogTraceSink), Arc::new(store)];
    Ok(Arc::new(FanoutTraceSink::new(sinks)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &str) -> Config {
        toml::from_str(&format!("[auth]\npassphrases = [\"alohomora\"]\n{}", extra)).unwrap()
    }

    #[test]
    fn builds_with_defaults() {
        let services = build_services(&config("")).unwrap();
        assert_eq!(services.state.orchestrator.passphrases().len(), 1);
        assert!(services.state.tracker.is_empty());
    }

    #[test]
    fn invalid_config_is_refused() {
        let err = build_services(&Config::default()).err().unwrap();
        assert!(matches!(err, StartupError::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn trace_store_is_opened_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("spans.db");
        let services = build_services(&config(&format!(
            "[trace]\ndb_path = \"{}\"\n",
            db.display()
        )))
        .unwrap();
        assert!(db.exists());
        drop(services);
    }
}
