//! Edit-distance similarity.
//!
//! The Indel distance counts the insertions and deletions needed to turn
//! one string into the other (no substitutions). Normalizing it by the
//! combined length gives a ratio that treats a dropped letter and a split
//! word gently, which is what transcription errors look like.

use rapidfuzz::distance::indel;
use rapidfuzz::fuzz;

/// Insert/delete edit distance between `a` and `b`, over Unicode scalars.
pub fn indel_distance(a: &str, b: &str) -> usize {
    indel::distance(a.chars(), b.chars())
}

/// Similarity score in `[0, 100]`.
///
/// `100 × (1 − indel / (len(a) + len(b)))`. Two empty strings score `100`.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 100.0;
    }
    100.0 * fuzz::ratio(a.chars(), b.chars())
}
