use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("no audio detected")]
    NoAudio,

    #[error("{0} timed out")]
    Timeout(String),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// Whether the failure was the collaborator running out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
