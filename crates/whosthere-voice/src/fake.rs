//! Scripted collaborators for tests and local runs.
//!
//! [`ScriptedTransport`] turns a [`Capture::Speech`] into a clip whose bytes
//! are the spoken text, and [`ScriptedTranscriber`] echoes clip bytes back as
//! text when it has nothing else queued. Scripting the transport is therefore
//! enough to drive a whole visit.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use whosthere_types::PhraseKey;

use crate::collaborator::{
    AudioHandle, DoorbellTransport, SpeechSynthesizer, Transcriber, Transcript,
};
use crate::error::VoiceError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One phrase the fake speaker was asked to say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpokenPhrase {
    pub device_id: String,
    pub phrase: PhraseKey,
    /// False when the call failed or never finished.
    pub delivered: bool,
}

/// Speech synthesizer that records every request.
#[derive(Debug, Default)]
pub struct RecordingSpeech {
    spoken: Mutex<Vec<SpokenPhrase>>,
    fail_on: HashSet<PhraseKey>,
    hang_on: HashSet<PhraseKey>,
    latency: Duration,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request for `phrase` fails.
    pub fn fail_on(mut self, phrase: PhraseKey) -> Self {
        self.fail_on.insert(phrase);
        self
    }

    /// Every request for `phrase` never completes.
    pub fn hang_on(mut self, phrase: PhraseKey) -> Self {
        self.hang_on.insert(phrase);
        self
    }

    /// Each request takes `latency` before it resolves.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// All requests so far, in order.
    pub fn spoken(&self) -> Vec<SpokenPhrase> {
        lock(&self.spoken).clone()
    }

    /// Phrase keys requested so far, in order.
    pub fn phrases(&self) -> Vec<PhraseKey> {
        lock(&self.spoken).iter().map(|s| s.phrase).collect()
    }

    /// Phrase keys requested for one device, in order.
    pub fn phrases_for(&self, device_id: &str) -> Vec<PhraseKey> {
        lock(&self.spoken)
            .iter()
            .filter(|s| s.device_id == device_id)
            .map(|s| s.phrase)
            .collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSpeech {
    async fn speak(&self, device_id: &str, phrase: PhraseKey) -> Result<(), VoiceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let delivered = !self.fail_on.contains(&phrase) && !self.hang_on.contains(&phrase);
        lock(&self.spoken).push(SpokenPhrase {
            device_id: device_id.to_string(),
            phrase,
            delivered,
        });

        if self.hang_on.contains(&phrase) {
            std::future::pending::<()>().await;
        }
        if self.fail_on.contains(&phrase) {
            return Err(VoiceError::Tts(format!("scripted failure for {}", phrase)));
        }
        Ok(())
    }
}

/// What the visitor does during one recording window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    /// The visitor says this text.
    Speech(String),
    /// Nothing is heard.
    Silence,
    /// The intercom reports an error.
    Fail(String),
    /// The recording never completes.
    Hang,
}

impl Capture {
    pub fn speech(text: impl Into<String>) -> Self {
        Self::Speech(text.into())
    }
}

/// Intercom whose recordings follow a script.
///
/// Per-device queues are consulted first, then the shared queue. An empty
/// script yields [`Capture::Silence`].
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    per_device: Mutex<HashMap<String, VecDeque<Capture>>>,
    shared: Mutex<VecDeque<Capture>>,
    recordings: Mutex<HashMap<String, usize>>,
    played: Mutex<Vec<(String, String)>>,
    fill_window: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared script used by any device without its own.
    pub fn with_captures(captures: impl IntoIterator<Item = Capture>) -> Self {
        let transport = Self::default();
        lock(&transport.shared).extend(captures);
        transport
    }

    /// Sleep for the full recording window before resolving.
    pub fn filling_window(mut self) -> Self {
        self.fill_window = true;
        self
    }

    pub fn push(&self, capture: Capture) {
        lock(&self.shared).push_back(capture);
    }

    pub fn push_for(&self, device_id: &str, capture: Capture) {
        lock(&self.per_device)
            .entry(device_id.to_string())
            .or_default()
            .push_back(capture);
    }

    /// Number of recordings started for `device_id`.
    pub fn recordings_for(&self, device_id: &str) -> usize {
        lock(&self.recordings).get(device_id).copied().unwrap_or(0)
    }

    /// `(device_id, clip label)` of every playback, in order.
    pub fn played(&self) -> Vec<(String, String)> {
        lock(&self.played).clone()
    }

    fn next_capture(&self, device_id: &str) -> Capture {
        if let Some(capture) = lock(&self.per_device)
            .get_mut(device_id)
            .and_then(VecDeque::pop_front)
        {
            return capture;
        }
        lock(&self.shared).pop_front().unwrap_or(Capture::Silence)
    }
}

#[async_trait]
impl DoorbellTransport for ScriptedTransport {
    async fn record(&self, device_id: &str, duration: Duration) -> Result<AudioHandle, VoiceError> {
        *lock(&self.recordings)
            .entry(device_id.to_string())
            .or_insert(0) += 1;
        let capture = self.next_capture(device_id);

        if self.fill_window {
            tokio::time::sleep(duration).await;
        }

        match capture {
            Capture::Speech(text) => Ok(AudioHandle::new(
                format!("{}-answer", device_id),
                text.into_bytes(),
            )),
            Capture::Silence => Err(VoiceError::NoAudio),
            Capture::Fail(message) => Err(VoiceError::Transport(message)),
            Capture::Hang => std::future::pending().await,
        }
    }

    async fn play(&self, device_id: &str, audio: &AudioHandle) -> Result<(), VoiceError> {
        lock(&self.played).push((device_id.to_string(), audio.label().to_string()));
        Ok(())
    }
}

/// Scripted transcription result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Fail(String),
    /// The backend reports its own timeout.
    Timeout,
    /// The call never completes.
    Hang,
}

/// Transcriber that replays queued replies.
///
/// With an empty queue it reads the clip bytes as UTF-8 text.
#[derive(Debug, Default)]
pub struct ScriptedTranscriber {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<usize>,
    latency: Duration,
}

impl ScriptedTranscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: impl IntoIterator<Item = Reply>) -> Self {
        let transcriber = Self::default();
        lock(&transcriber.replies).extend(replies);
        transcriber
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, audio: &AudioHandle) -> Result<Transcript, VoiceError> {
        *lock(&self.calls) += 1;
        let reply = lock(&self.replies).pop_front();

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match reply {
            Some(Reply::Text(text)) => Ok(Transcript::new(text)),
            Some(Reply::Fail(message)) => Err(VoiceError::Stt(message)),
            Some(Reply::Timeout) => Err(VoiceError::Timeout("scripted transcription".to_string())),
            Some(Reply::Hang) => std::future::pending().await,
            None => Ok(Transcript::new(String::from_utf8_lossy(audio.data()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transport_prefers_device_script() {
        let transport = ScriptedTransport::with_captures([Capture::speech("shared")]);
        transport.push_for("door-2", Capture::speech("own"));

        let own = transport.record("door-2", Duration::ZERO).await.unwrap();
        assert_eq!(own.data(), b"own");
        let shared = transport.record("door-2", Duration::ZERO).await.unwrap();
        assert_eq!(shared.data(), b"shared");
        assert!(matches!(
            transport.record("door-2", Duration::ZERO).await,
            Err(VoiceError::NoAudio)
        ));
        assert_eq!(transport.recordings_for("door-2"), 3);
    }

    #[tokio::test]
    async fn transcriber_echoes_when_unscripted() {
        let transcriber = ScriptedTranscriber::with_replies([Reply::Fail("boom".into())]);
        let clip = AudioHandle::new("clip", b"alohomora".to_vec());

        assert!(matches!(
            transcriber.transcribe(&clip).await,
            Err(VoiceError::Stt(_))
        ));
        assert_eq!(transcriber.transcribe(&clip).await.unwrap().text, "alohomora");
        assert_eq!(transcriber.calls(), 2);
    }

    #[tokio::test]
    async fn speech_records_failures_as_undelivered() {
        let speech = RecordingSpeech::new().fail_on(PhraseKey::Success);
        speech.speak("door-1", PhraseKey::Challenge).await.unwrap();
        assert!(speech.speak("door-1", PhraseKey::Success).await.is_err());

        let spoken = speech.spoken();
        assert!(spoken[0].delivered);
        assert!(!spoken[1].delivered);
        assert_eq!(
            speech.phrases_for("door-1"),
            vec![PhraseKey::Challenge, PhraseKey::Success]
        );
    }
}
