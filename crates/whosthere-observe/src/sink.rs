//! The sink contract and the in-process sinks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::error::TraceError;
use crate::span::{SpanHandle, SpanMetadata, SpanMetrics, SpanOutcome, SpanRecord};

/// Destination for span records.
///
/// Methods are synchronous so a span can be closed from `Drop`; sinks must
/// return quickly and never block on the network.
pub trait TraceSink: Send + Sync {
    fn start_span(&self, name: &str, metadata: &SpanMetadata) -> Result<SpanHandle, TraceError>;

    fn end_span(
        &self,
        handle: SpanHandle,
        outcome: SpanOutcome,
        metrics: &SpanMetrics,
    ) -> Result<(), TraceError>;
}

impl<T: TraceSink + ?Sized> TraceSink for Arc<T> {
    fn start_span(&self, name: &str, metadata: &SpanMetadata) -> Result<SpanHandle, TraceError> {
        (**self).start_span(name, metadata)
    }

    fn end_span(
        &self,
        handle: SpanHandle,
        outcome: SpanOutcome,
        metrics: &SpanMetrics,
    ) -> Result<(), TraceError> {
        (**self).end_span(handle, outcome, metrics)
    }
}

/// Writes spans as `tracing` events on the `whosthere::trace` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTraceSink;

impl TraceSink for LogTraceSink {
    fn start_span(&self, name: &str, metadata: &SpanMetadata) -> Result<SpanHandle, TraceError> {
        let handle = SpanHandle::new(name);
        tracing::debug!(
            target: "whosthere::trace",
            span_id = %handle.id(),
            span = name,
            session_id = ?metadata.session_id,
            device_id = %metadata.device_id,
            attempt = ?metadata.attempt,
            "span started"
        );
        Ok(handle)
    }

    fn end_span(
        &self,
        handle: SpanHandle,
        outcome: SpanOutcome,
        metrics: &SpanMetrics,
    ) -> Result<(), TraceError> {
        match outcome {
            SpanOutcome::Ok => tracing::info!(
                target: "whosthere::trace",
                span_id = %handle.id(),
                span = handle.name(),
                %outcome,
                latency_ms = metrics.latency_ms,
                score = ?metrics.score,
                matched_index = ?metrics.matched_index,
                transcript_chars = ?metrics.transcript_chars,
                "span finished"
            ),
            _ => tracing::warn!(
                target: "whosthere::trace",
                span_id = %handle.id(),
                span = handle.name(),
                %outcome,
                latency_ms = metrics.latency_ms,
                score = ?metrics.score,
                detail = metrics.detail.as_deref().unwrap_or(""),
                "span finished"
            ),
        }
        Ok(())
    }
}

/// Keeps every span in memory, in start order.
#[derive(Debug)]
pub struct MemoryTraceSink {
    records: Mutex<Vec<SpanRecord>>,
    available: AtomicBool,
}

impl Default for MemoryTraceSink {
    fn default() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// When false, every call fails with [`TraceError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<SpanRecord> {
        self.lock().clone()
    }

    /// Span names in start order.
    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|r| r.name.clone()).collect()
    }

    /// Finished spans named `name`, in start order.
    pub fn finished(&self, name: &str) -> Vec<SpanRecord> {
        self.lock()
            .iter()
            .filter(|r| r.name == name && !r.is_open())
            .cloned()
            .collect()
    }

    /// Spans that were started but never ended.
    pub fn open_spans(&self) -> Vec<SpanRecord> {
        self.lock().iter().filter(|r| r.is_open()).cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SpanRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), TraceError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TraceError::Unavailable("memory sink switched off".to_string()))
        }
    }
}

impl TraceSink for MemoryTraceSink {
    fn start_span(&self, name: &str, metadata: &SpanMetadata) -> Result<SpanHandle, TraceError> {
        self.check_available()?;
        let handle = SpanHandle::new(name);
        self.lock().push(SpanRecord::open(&handle, metadata));
        Ok(handle)
    }

    fn end_span(
        &self,
        handle: SpanHandle,
        outcome: SpanOutcome,
        metrics: &SpanMetrics,
    ) -> Result<(), TraceError> {
        self.check_available()?;
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|r| r.span_id == handle.id())
            .ok_or(TraceError::UnknownSpan(handle.id()))?;
        record.ended_at = Some(Utc::now());
        record.outcome = Some(outcome);
        record.metrics = metrics.clone();
        Ok(())
    }
}

/// Forwards every span to several sinks.
///
/// A failing member does not stop the others; the first error is returned
/// after all members were tried.
#[derive(Default)]
pub struct FanoutTraceSink {
    sinks: Vec<Arc<dyn TraceSink>>,
    open: Mutex<HashMap<uuid::Uuid, Vec<Option<SpanHandle>>>>,
}

impl std::fmt::Debug for FanoutTraceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutTraceSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl FanoutTraceSink {
    pub fn new(sinks: Vec<Arc<dyn TraceSink>>) -> Self {
        Self {
            sinks,
            open: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn open(&self) -> MutexGuard<'_, HashMap<uuid::Uuid, Vec<Option<SpanHandle>>>> {
        self.open.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TraceSink for FanoutTraceSink {
    fn start_span(&self, name: &str, metadata: &SpanMetadata) -> Result<SpanHandle, TraceError> {
        let handle = SpanHandle::new(name);
        let mut first_error = None;
        let members: Vec<Option<SpanHandle>> = self
            .sinks
            .iter()
            .map(|sink| match sink.start_span(name, metadata) {
                Ok(member) => Some(member),
                Err(e) => {
                    first_error.get_or_insert(e);
                    None
                }
            })
            .collect();

        if members.iter().all(Option::is_none) {
            if let Some(e) = first_error {
                return Err(e);
            }
        }
        self.open().insert(handle.id(), members);
        Ok(handle)
    }

    fn end_span(
        &self,
        handle: SpanHandle,
        outcome: SpanOutcome,
        metrics: &SpanMetrics,
    ) -> Result<(), TraceError> {
        let members = self
            .open()
            .remove(&handle.id())
            .ok_or(TraceError::UnknownSpan(handle.id()))?;

        let mut first_error = None;
        for (sink, member) in self.sinks.iter().zip(members) {
            if let Some(member) = member {
                if let Err(e) = sink.end_span(member, outcome, metrics) {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
