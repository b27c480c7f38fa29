//! Error types for the span sinks.

use uuid::Uuid;

use crate::migrations::MigrationError;
use crate::pool::PoolError;

/// Errors a [`TraceSink`](crate::TraceSink) can report.
///
/// Callers treat every variant as non-fatal; telemetry is best-effort.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// A database operation failed.
    #[error("trace database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No pooled connection could be obtained.
    #[error("trace pool error: {0}")]
    Connection(#[from] r2d2::Error),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// `end_span` was called for a span this sink never started.
    #[error("unknown span: {0}")]
    UnknownSpan(Uuid),

    /// The sink is switched off or unreachable.
    #[error("trace sink unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded.
    #[error("corrupt span row: {0}")]
    Corrupt(String),
}
