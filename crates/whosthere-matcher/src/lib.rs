//! Fuzzy passphrase matching.
//!
//! Compares a speech-to-text transcript against the configured secret
//! passphrases and reports the best similarity score. Transcription is
//! noisy ("alo mora" for "alohomora"), so an exact comparison is useless;
//! instead every passphrase gets a score in `[0, 100]` and the best one
//! wins if it reaches the threshold.
//!
//! # Properties
//!
//! - Both sides go through the same [`normalize`] step (case-fold, trim,
//!   collapse whitespace). [`PassphraseSet`] does it once at load time.
//! - Scores come from [`similarity`], an Indel ratio: `100` only for equal
//!   normalized strings, higher means more similar.
//! - Ties go to the earliest passphrase in configured order.
//! - Empty candidate text yields `matched = false, score = 0`.
//! - Everything is pure. No I/O, no shared state.
//!
//! ```
//! use whosthere_matcher::fuzzy_match;
//!
//! let result = fuzzy_match("Alo  Mora", &["alohomora", "mellon"], 80.0);
//! assert!(result.matched);
//! assert_eq!(result.matched_phrase_index, Some(0));
//! ```

mod error;
mod normalize;
mod passphrase;
mod similarity;

pub use error::MatcherError;
pub use normalize::normalize;
pub use passphrase::{fuzzy_match, PassphraseSet};
pub use similarity::{indel_distance, similarity};
pub use whosthere_types::MatchResult;
