use crate::collaborator::{AudioHandle, DoorbellTransport};
use crate::error::VoiceError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// A stand-in for real intercom hardware.
///
/// Playback only logs. Recording waits for the requested window and then
/// returns the configured sample file, or [`VoiceError::NoAudio`] when no
/// sample is set, which behaves like a visitor who says nothing.
#[derive(Debug, Clone, Default)]
pub struct SimulatedIntercom {
    sample_recording: Option<PathBuf>,
    simulate_window: bool,
}

impl SimulatedIntercom {
    pub fn new(sample_recording: Option<PathBuf>) -> Self {
        Self {
            sample_recording,
            simulate_window: true,
        }
    }

    /// Return immediately from `record` instead of waiting out the window.
    pub fn without_recording_delay(mut self) -> Self {
        self.simulate_window = false;
        self
    }
}

#[async_trait]
impl DoorbellTransport for SimulatedIntercom {
    async fn record(&self, device_id: &str, duration: Duration) -> Result<AudioHandle, VoiceError> {
        info!(
            device_id,
            window_ms = duration.as_millis() as u64,
            "simulated intercom recording"
        );
        if self.simulate_window {
            tokio::time::sleep(duration).await;
        }

        let Some(path) = &self.sample_recording else {
            return Err(VoiceError::NoAudio);
        };

        let data = tokio::fs::read(path).await.map_err(|e| {
            VoiceError::Transport(format!("failed to read sample recording {:?}: {}", path, e))
        })?;
        if data.is_empty() {
            return Err(VoiceError::NoAudio);
        }

        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sample".to_string());
        Ok(AudioHandle::new(label, data))
    }

    async fn play(&self, device_id: &str, audio: &AudioHandle) -> Result<(), VoiceError> {
        info!(
            device_id,
            clip = audio.label(),
            bytes = audio.len(),
            "simulated intercom playing"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn no_sample_means_silence() {
        let intercom = SimulatedIntercom::new(None).without_recording_delay();
        let err = intercom
            .record("door-1", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::NoAudio));
    }

    #[tokio::test]
    async fn sample_file_is_returned() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"RIFF....").unwrap();

        let intercom =
            SimulatedIntercom::new(Some(file.path().to_path_buf())).without_recording_delay();
        let clip = intercom.record("door-1", Duration::from_secs(5)).await.unwrap();
        assert_eq!(clip.data(), b"RIFF....");
    }

    #[tokio::test(start_paused = true)]
    async fn recording_waits_for_the_window() {
        let intercom = SimulatedIntercom::new(None);
        let started = tokio::time::Instant::now();
        let _ = intercom.record("door-1", Duration::from_secs(5)).await;
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_sample_is_a_transport_error() {
        let intercom = SimulatedIntercom::new(Some(PathBuf::from("/nonexistent/sample.wav")))
            .without_recording_delay();
        let err = intercom
            .record("door-1", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::Transport(_)));
    }
}
