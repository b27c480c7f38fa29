//! Best-effort span emission around orchestrator steps.

use std::sync::Arc;

use tokio::time::Instant;
use whosthere_observe::{
    LogTraceSink, SpanHandle, SpanMetadata, SpanMetrics, SpanOutcome, TraceSink,
};

/// Wraps a [`TraceSink`] so that sink failures never reach the visit.
#[derive(Clone)]
pub struct Tracer {
    sink: Arc<dyn TraceSink>,
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(Arc::new(LogTraceSink))
    }
}

impl Tracer {
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self { sink }
    }

    /// Opens a span. If the sink refuses, the returned span is inert.
    pub fn start(&self, name: &'static str, metadata: SpanMetadata) -> ActiveSpan {
        let handle = match self.sink.start_span(name, &metadata) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(span = name, error = %e, "trace sink failed to start span");
                None
            }
        };
        ActiveSpan {
            sink: self.sink.clone(),
            name,
            handle,
            started: Instant::now(),
            metrics: SpanMetrics::default(),
        }
    }
}

/// A span in progress.
///
/// Dropping it without calling [`finish`](Self::finish) closes it as
/// [`SpanOutcome::Abandoned`], which is what happens to in-flight steps
/// when a visit future is cancelled.
pub struct ActiveSpan {
    sink: Arc<dyn TraceSink>,
    name: &'static str,
    handle: Option<SpanHandle>,
    started: Instant,
    metrics: SpanMetrics,
}

impl ActiveSpan {
    pub fn metrics_mut(&mut self) -> &mut SpanMetrics {
        &mut self.metrics
    }

    pub fn set_detail(&mut self, detail: impl Into<String>) {
        self.metrics.detail = Some(detail.into());
    }

    pub fn finish(mut self, outcome: SpanOutcome) {
        self.close(outcome);
    }

    fn close(&mut self, outcome: SpanOutcome) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.metrics.latency_ms =
            u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if let Err(e) = self.sink.end_span(handle, outcome, &self.metrics) {
            tracing::warn!(span = self.name, error = %e, "trace sink failed to end span");
        }
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        self.close(SpanOutcome::Abandoned);
    }
}
