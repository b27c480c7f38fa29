use crate::collaborator::{AudioHandle, Transcriber, Transcript};
use crate::error::VoiceError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum audio input size for STT (10 MiB). A doorbell answer is a few
/// seconds; anything larger is a transport bug.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Default timeout for the STT process.
const DEFAULT_STT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transcribes by piping audio into a whisper.cpp-compatible binary.
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    model_path: PathBuf,
    binary_path: PathBuf,
    language: String,
    timeout: Duration,
}

impl WhisperTranscriber {
    pub fn new(model_path: impl Into<PathBuf>, binary_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            binary_path: binary_path.into(),
            language: "de".to_string(),
            timeout: DEFAULT_STT_TIMEOUT,
        }
    }

    /// Spoken language hint passed as `-l`.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, audio_data: &[u8]) -> Result<String, VoiceError> {
        if audio_data.is_empty() {
            return Err(VoiceError::NoAudio);
        }
        if audio_data.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::Stt(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio_data.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        // whisper.cpp: -m <model> -l <lang> -nt (no timestamps) -f - (stdin)
        let mut command = Command::new(&self.binary_path);
        command
            .arg("-m")
            .arg(&self.model_path)
            .arg("-l")
            .arg(&self.language)
            .arg("-nt")
            .arg("-f")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Unavailable(format!("failed to spawn STT binary: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Stt("failed to open stdin".to_string()))?;

        // Write from a task so a full stdout pipe cannot deadlock us.
        let audio = audio_data.to_vec();
        let write_task = tokio::spawn(async move { stdin.write_all(&audio).await });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| VoiceError::Timeout("STT process".to_string()))?
            .map_err(|e| VoiceError::Stt(format!("failed to read stdout: {}", e)))?;

        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(VoiceError::Stt(format!("failed to write to stdin: {}", e)));
            }
            Err(e) => return Err(VoiceError::Stt(format!("stdin task failed: {}", e))),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Stt(format!("STT binary failed: {}", stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &AudioHandle) -> Result<Transcript, VoiceError> {
        let text = self.run(audio.data()).await?;
        tracing::debug!(
            clip = audio.label(),
            bytes = audio.len(),
            chars = text.chars().count(),
            "transcribed clip"
        );
        Ok(Transcript::new(text))
    }
}

/// Returns the same transcript for every clip.
///
/// Development stand-in when no STT backend is installed.
#[derive(Clone)]
pub struct FixedTranscriber {
    text: String,
}

impl FixedTranscriber {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl std::fmt::Debug for FixedTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedTranscriber")
            .field("text", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, audio: &AudioHandle) -> Result<Transcript, VoiceError> {
        if audio.is_empty() {
            return Err(VoiceError::NoAudio);
        }
        tracing::warn!(clip = audio.label(), "using fixed transcription");
        Ok(Transcript::new(self.text.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oversized_audio_is_rejected_before_spawning() {
        let stt = WhisperTranscriber::new("model.bin", "/nonexistent/whisper");
        let clip = AudioHandle::new("big", vec![0u8; MAX_STT_INPUT_BYTES + 1]);
        match stt.transcribe(&clip).await {
            Err(VoiceError::Stt(msg)) => assert!(msg.contains("exceeds maximum size")),
            other => panic!("expected size error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_audio_is_no_audio() {
        let stt = WhisperTranscriber::new("model.bin", "/nonexistent/whisper");
        let clip = AudioHandle::new("empty", Vec::new());
        assert!(matches!(stt.transcribe(&clip).await, Err(VoiceError::NoAudio)));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let stt = WhisperTranscriber::new("model.bin", "/nonexistent/whisper");
        let clip = AudioHandle::new("clip", vec![1u8; 16]);
        assert!(matches!(
            stt.transcribe(&clip).await,
            Err(VoiceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn fixed_transcriber_repeats_its_text() {
        let stt = FixedTranscriber::new("alohomora");
        let clip = AudioHandle::new("clip", vec![1u8; 4]);
        assert_eq!(stt.transcribe(&clip).await.unwrap().text, "alohomora");
        assert!(!format!("{stt:?}").contains("alohomora"));
    }
}
