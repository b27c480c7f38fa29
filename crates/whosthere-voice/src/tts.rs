use crate::collaborator::{AudioHandle, DoorbellTransport, SpeechSynthesizer};
use crate::error::VoiceError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use whosthere_types::PhraseKey;

/// Maximum size of one pre-rendered clip (8 MiB).
const MAX_CLIP_BYTES: u64 = 8 * 1024 * 1024;

/// Clip files tried for a phrase, in order.
///
/// Phrases without a dedicated recording fall back to the closest one.
pub fn clip_candidates(phrase: PhraseKey) -> &'static [&'static str] {
    match phrase {
        PhraseKey::Challenge => &["witch_password.mp3"],
        PhraseKey::Success => &["witch_welcome.mp3"],
        PhraseKey::WrongPassword => &["witch_wrong.mp3"],
        PhraseKey::RetryPrompt | PhraseKey::NoInputPrompt => &["witch_repeat.mp3"],
        PhraseKey::Denied => &["witch_denied.mp3"],
        PhraseKey::SystemError => &["witch_error.mp3", "witch_denied.mp3"],
        PhraseKey::Timeout => &["witch_timeout.mp3", "witch_denied.mp3"],
    }
}

/// Speaks phrases by playing pre-rendered clips through a transport.
///
/// Clips are read once and cached; the cache is keyed by phrase.
#[derive(Clone)]
pub struct PrerenderedSpeech {
    clips_dir: PathBuf,
    transport: Arc<dyn DoorbellTransport>,
    cache: Arc<RwLock<HashMap<PhraseKey, AudioHandle>>>,
}

impl std::fmt::Debug for PrerenderedSpeech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrerenderedSpeech")
            .field("clips_dir", &self.clips_dir)
            .finish_non_exhaustive()
    }
}

impl PrerenderedSpeech {
    pub fn new(clips_dir: impl AsRef<Path>, transport: Arc<dyn DoorbellTransport>) -> Self {
        Self {
            clips_dir: clips_dir.as_ref().to_path_buf(),
            transport,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Loads every phrase once, returning the phrases that have no clip.
    ///
    /// Meant for startup checks; a missing clip is not fatal because the
    /// orchestrator treats playback failure per phrase.
    pub async fn verify(&self) -> Vec<PhraseKey> {
        let mut missing = Vec::new();
        for phrase in PhraseKey::ALL {
            if let Err(e) = self.clip(phrase).await {
                tracing::warn!(%phrase, error = %e, "phrase clip unavailable");
                missing.push(phrase);
            }
        }
        missing
    }

    /// Returns the cached clip for `phrase`, loading it on first use.
    pub async fn clip(&self, phrase: PhraseKey) -> Result<AudioHandle, VoiceError> {
        if let Some(handle) = self.cache.read().await.get(&phrase) {
            return Ok(handle.clone());
        }

        let handle = self.load(phrase).await?;
        self.cache.write().await.insert(phrase, handle.clone());
        Ok(handle)
    }

    async fn load(&self, phrase: PhraseKey) -> Result<AudioHandle, VoiceError> {
        for name in clip_candidates(phrase) {
            let path = self.clips_dir.join(name);
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            if metadata.len() > MAX_CLIP_BYTES {
                return Err(VoiceError::Tts(format!(
                    "clip exceeds maximum size: {:?} is {} bytes (limit: {} bytes)",
                    path,
                    metadata.len(),
                    MAX_CLIP_BYTES
                )));
            }

            let data = tokio::fs::read(&path).await?;
            tracing::debug!(%phrase, clip = name, bytes = data.len(), "loaded phrase clip");
            return Ok(AudioHandle::new(*name, data));
        }

        Err(VoiceError::Tts(format!(
            "clip not found for phrase {} in {:?}",
            phrase, self.clips_dir
        )))
    }
}

#[async_trait]
impl SpeechSynthesizer for PrerenderedSpeech {
    async fn speak(&self, device_id: &str, phrase: PhraseKey) -> Result<(), VoiceError> {
        let clip = self.clip(phrase).await?;
        self.transport.play(device_id, &clip).await
    }
}
