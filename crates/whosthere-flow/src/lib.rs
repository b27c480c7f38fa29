//! Doorbell session orchestration.
//!
//! [`Orchestrator::handle_doorbell_event`] runs one visit: it opens a
//! session, speaks the challenge, records and transcribes the answer,
//! scores it against the passphrase set, and repeats until the visitor is
//! granted, denied, runs out of time, or a collaborator fails in a way that
//! cannot be retried.
//!
//! The visit is an explicit loop over a small step enum. Before every step
//! the session deadline is checked, and every collaborator call is bounded
//! by the shorter of the call timeout and the time left. Each step is
//! wrapped in a trace span; the score of an answer is traced before the
//! decision it drives.
//!
//! Settings and passphrases are handed in once as immutable values, so a
//! test can drive the whole flow with synthetic phrases and the scripted
//! collaborators from `whosthere_voice::fake`.

mod error;
mod orchestrator;
mod rate_limit;
mod report;
mod settings;
mod trace;

pub use error::FlowError;
pub use orchestrator::{Collaborators, Orchestrator};
pub use rate_limit::DeviceRateLimiter;
pub use report::{VisitReason, VisitReport};
pub use settings::{CaptureFailurePolicy, FlowSettings, RateLimitSettings};
pub use trace::{ActiveSpan, Tracer};
