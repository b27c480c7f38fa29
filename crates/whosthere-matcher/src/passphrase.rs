//! The secret passphrase set and the matching entry points.

use std::fmt;

use crate::error::MatcherError;
use crate::normalize::normalize;
use crate::similarity::similarity;
use whosthere_types::MatchResult;

/// Immutable, pre-normalized collection of secret passphrases.
///
/// Loaded once from configuration. The `Debug` impl prints only the number
/// of phrases so the set can sit inside logged structs.
#[derive(Clone, PartialEq, Eq)]
pub struct PassphraseSet {
    phrases: Vec<String>,
}

impl PassphraseSet {
    /// Normalizes and stores `phrases`, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError::Empty`] when no phrases are given and
    /// [`MatcherError::BlankPhrase`] when one normalizes to nothing.
    pub fn new<I, S>(phrases: I) -> Result<Self, MatcherError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for (index, phrase) in phrases.into_iter().enumerate() {
            let phrase = normalize(phrase.as_ref());
            if phrase.is_empty() {
                return Err(MatcherError::BlankPhrase { index });
            }
            normalized.push(phrase);
        }

        if normalized.is_empty() {
            return Err(MatcherError::Empty);
        }

        Ok(Self { phrases: normalized })
    }

    /// Number of passphrases.
    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    /// Always false for a constructed set; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Scores `candidate` against every passphrase.
    pub fn check(&self, candidate: &str, threshold: f64) -> MatchResult {
        best_match(&normalize(candidate), self.phrases.iter().map(String::as_str), threshold)
    }
}

impl fmt::Debug for PassphraseSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassphraseSet")
            .field("count", &self.phrases.len())
            .field("phrases", &"[REDACTED]")
            .finish()
    }
}

/// Scores `candidate` against raw, un-normalized `passphrases`.
///
/// Both sides are normalized the same way [`PassphraseSet`] does, so the
/// result equals `PassphraseSet::new(passphrases)?.check(candidate, threshold)`
/// for any valid set. Never fails: empty input simply misses with score 0.
pub fn fuzzy_match<S: AsRef<str>>(candidate: &str, passphrases: &[S], threshold: f64) -> MatchResult {
    let normalized: Vec<String> = passphrases.iter().map(|p| normalize(p.as_ref())).collect();
    best_match(
        &normalize(candidate),
        normalized.iter().map(String::as_str),
        threshold,
    )
}

fn best_match<'a>(
    candidate: &str,
    phrases: impl Iterator<Item = &'a str>,
    threshold: f64,
) -> MatchResult {
    if candidate.is_empty() {
        return MatchResult::miss(0.0);
    }

    let mut best: Option<(usize, f64)> = None;
    for (index, phrase) in phrases.enumerate() {
        let score = if phrase == candidate {
            100.0
        } else {
            similarity(candidate, phrase)
        };
        // Strictly greater: ties keep the earliest index.
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((index, score));
        }
    }

    match best {
        Some((index, score)) if score >= threshold => MatchResult::hit(score, index),
        Some((_, score)) => MatchResult::miss(score),
        None => MatchResult::miss(0.0),
    }
}
