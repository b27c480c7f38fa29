//! Span sinks for doorbell visit telemetry.
//!
//! The orchestrator wraps every step of a visit in a span: a start record
//! carrying who and what ([`SpanMetadata`]), and an end record carrying how
//! it went ([`SpanOutcome`]) and what it measured ([`SpanMetrics`]). This
//! crate provides the [`TraceSink`] contract those records are written to
//! and the sinks a deployment chooses from:
//!
//! | Sink | Use |
//! |------|-----|
//! | [`LogTraceSink`] | Re-emits spans as `tracing` events. Always available. |
//! | [`MemoryTraceSink`] | Keeps spans in memory for inspection in tests. |
//! | [`SqliteTraceSink`] | Persists spans to the `trace_spans` table. |
//! | [`FanoutTraceSink`] | Writes to several sinks at once. |
//!
//! Span metrics hold scores, indices, and lengths. Passphrases and
//! transcript text have no field to go in.
//!
//! # Usage
//!
//! ```rust,ignore
//! use whosthere_observe::{SpanMetadata, SpanMetrics, SpanOutcome, TraceSink};
//!
//! let handle = sink.start_span("capture", &SpanMetadata::for_device("door-1"))?;
//! sink.end_span(handle, SpanOutcome::Ok, &SpanMetrics::with_latency(412))?;
//! ```

mod error;
mod migrations;
mod pool;
mod sink;
mod span;
mod store;

pub use error::TraceError;
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbRuntimeSettings, PoolError, TracePool};
pub use sink::{FanoutTraceSink, LogTraceSink, MemoryTraceSink, TraceSink};
pub use span::{
    ParseSpanOutcomeError, SpanHandle, SpanMetadata, SpanMetrics, SpanOutcome, SpanRecord,
};
pub use store::{query_spans, SpanFilter, SqliteTraceSink};
