//! Per-visit session state for the whosthere intercom.
//!
//! A [`Session`] is one doorbell press: which device rang, how many answers
//! were heard, the last similarity score, and when the visit must be
//! decided by. The [`SessionTracker`] is an in-memory keyed store of them.
//!
//! # Concurrency
//!
//! Each session sits behind its own mutex, so attempt recording for one
//! session is serialized while sessions for different devices never
//! contend. The outer map lock is held only for lookups, inserts, and
//! eviction; no lock is ever held across an `.await`.
//!
//! # Lifetime
//!
//! Sessions are created in `pending`, driven through the status machine in
//! [`whosthere_types::SessionStatus`], and evicted once terminal and older
//! than a retention window. Eviction is housekeeping only; nothing reads a
//! session after its visit has returned.

mod error;
mod session;
mod tracker;

pub use error::TrackerError;
pub use session::{AttemptOutcome, Session};
pub use tracker::{SessionTracker, DEFAULT_MAX_LIVE_SESSIONS};
