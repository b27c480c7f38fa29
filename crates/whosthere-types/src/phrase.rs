//! The fixed set of phrases the intercom can speak.

use serde::{Deserialize, Serialize};

/// Selects one of the pre-defined spoken phrases.
///
/// The orchestrator only ever refers to phrases by key. Whether a key is
/// backed by a pre-rendered clip or by live synthesis is up to the speech
/// collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhraseKey {
    /// The opening challenge ("Password?").
    Challenge,
    /// Asks the visitor to try again after a wrong password.
    RetryPrompt,
    /// Asks the visitor to repeat after silence or an unintelligible answer.
    NoInputPrompt,
    /// Welcome message on a successful match.
    Success,
    /// Tells the visitor the password was wrong.
    WrongPassword,
    /// Final denial after the last attempt.
    Denied,
    /// Generic failure message.
    SystemError,
    /// The session ran out of time.
    Timeout,
}

impl PhraseKey {
    /// Every phrase key, in declaration order.
    pub const ALL: [PhraseKey; 8] = [
        Self::Challenge,
        Self::RetryPrompt,
        Self::NoInputPrompt,
        Self::Success,
        Self::WrongPassword,
        Self::Denied,
        Self::SystemError,
        Self::Timeout,
    ];

    /// Returns the canonical string label for this phrase.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Challenge => "challenge",
            Self::RetryPrompt => "retry-prompt",
            Self::NoInputPrompt => "no-input-prompt",
            Self::Success => "success",
            Self::WrongPassword => "wrong-password",
            Self::Denied => "denied",
            Self::SystemError => "system-error",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for PhraseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
