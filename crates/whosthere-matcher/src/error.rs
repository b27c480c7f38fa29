//! Error types for passphrase loading.

/// Errors raised while building a [`crate::PassphraseSet`].
///
/// Messages refer to passphrases by index only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatcherError {
    /// No passphrases were configured.
    #[error("passphrase set is empty")]
    Empty,

    /// A passphrase is empty after normalization.
    #[error("passphrase at index {index} is blank")]
    BlankPhrase {
        /// Position in the configured ordering.
        index: usize,
    },
}
