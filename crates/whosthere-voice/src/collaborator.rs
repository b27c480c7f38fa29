//! Collaborator traits and the values that flow through them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;
use whosthere_types::PhraseKey;

use crate::error::VoiceError;

/// An opaque, cheaply clonable audio clip.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioHandle {
    id: Uuid,
    label: String,
    data: Arc<[u8]>,
}

impl AudioHandle {
    pub fn new(label: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            data: data.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Where the clip came from (file name, device, ...). Never secret.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for AudioHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioHandle")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Text heard in a clip.
///
/// The text may well be a passphrase, so `Debug` shows only its length.
#[derive(Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    /// Backend confidence in `[0, 1]`, when the backend reports one.
    pub confidence: Option<f32>,
}

impl Transcript {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Number of characters, safe to log.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

impl fmt::Debug for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transcript")
            .field("chars", &self.char_count())
            .field("confidence", &self.confidence)
            .finish()
    }
}

/// Speaks fixed phrases on a device.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, device_id: &str, phrase: PhraseKey) -> Result<(), VoiceError>;
}

/// Turns recorded audio into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &AudioHandle) -> Result<Transcript, VoiceError>;
}

/// Microphone and speaker of a physical intercom.
#[async_trait]
pub trait DoorbellTransport: Send + Sync {
    /// Records up to `duration` of audio.
    ///
    /// Returns [`VoiceError::NoAudio`] when nothing was heard.
    async fn record(&self, device_id: &str, duration: Duration) -> Result<AudioHandle, VoiceError>;

    async fn play(&self, device_id: &str, audio: &AudioHandle) -> Result<(), VoiceError>;
}
