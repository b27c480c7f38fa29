//! SQLite persistence for spans.
//!
//! [`SqliteTraceSink`] inserts a row when a span starts and completes it
//! when the span ends. Reads go through [`query_spans`], which filters by
//! name, session, device, outcome, and start time.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::TraceError;
use crate::migrations::run_migrations;
use crate::pool::{create_pool, DbRuntimeSettings, TracePool};
use crate::sink::TraceSink;
use crate::span::{SpanHandle, SpanMetadata, SpanMetrics, SpanOutcome, SpanRecord};

/// Timestamps are stored as fixed-width RFC 3339 text so that string order
/// is time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TraceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| TraceError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

/// Span sink backed by a pooled SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteTraceSink {
    pool: TracePool,
}

impl SqliteTraceSink {
    /// Wraps an existing pool. The schema must already be migrated.
    pub fn new(pool: TracePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `db_path` and migrates it.
    pub fn open(db_path: &str, settings: DbRuntimeSettings) -> Result<Self, TraceError> {
        let pool = create_pool(db_path, settings)?;
        let conn = pool.get()?;
        let applied = run_migrations(&conn)?;
        tracing::info!(db_path, applied, "trace store ready");
        drop(conn);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &TracePool {
        &self.pool
    }

    /// Fetches one span by id.
    pub fn span(&self, span_id: Uuid) -> Result<Option<SpanRecord>, TraceError> {
        let conn = self.pool.get()?;
        find_span(&conn, span_id)
    }

    /// Queries stored spans; see [`query_spans`].
    pub fn query(&self, filter: &SpanFilter) -> Result<Vec<SpanRecord>, TraceError> {
        let conn = self.pool.get()?;
        query_spans(&conn, filter)
    }
}

impl TraceSink for SqliteTraceSink {
    fn start_span(&self, name: &str, metadata: &SpanMetadata) -> Result<SpanHandle, TraceError> {
        let handle = SpanHandle::new(name);
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO trace_spans (span_id, name, session_id, device_id, attempt, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                handle.id().to_string(),
                name,
                metadata.session_id.map(|id| id.to_string()),
                metadata.device_id,
                metadata.attempt,
                timestamp(Utc::now()),
            ],
        )?;
        Ok(handle)
    }

    fn end_span(
        &self,
        handle: SpanHandle,
        outcome: SpanOutcome,
        metrics: &SpanMetrics,
    ) -> Result<(), TraceError> {
        let conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE trace_spans
             SET ended_at = ?2, outcome = ?3, latency_ms = ?4, score = ?5,
                 matched_index = ?6, transcript_chars = ?7, detail = ?8
             WHERE span_id = ?1 AND outcome IS NULL",
            params![
                handle.id().to_string(),
                timestamp(Utc::now()),
                outcome.as_str(),
                i64::try_from(metrics.latency_ms).unwrap_or(i64::MAX),
                metrics.score,
                metrics.matched_index.map(|i| i as i64),
                metrics.transcript_chars.map(|n| n as i64),
                metrics.detail,
            ],
        )?;
        if updated == 0 {
            return Err(TraceError::UnknownSpan(handle.id()));
        }
        Ok(())
    }
}

/// Filter criteria for [`query_spans`].
#[derive(Debug, Clone, Default)]
pub struct SpanFilter {
    pub name: Option<String>,
    pub session_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub outcome: Option<SpanOutcome>,
    /// Spans started at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of spans to return (default: 100).
    pub limit: Option<i64>,
}

/// Returns stored spans in start order, oldest first.
pub fn query_spans(conn: &Connection, filter: &SpanFilter) -> Result<Vec<SpanRecord>, TraceError> {
    // WHERE clauses and bind parameters are collected separately so nothing
    // is interpolated.
    let mut clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1u32;

    if let Some(ref name) = filter.name {
        clauses.push(format!("name = ?{idx}"));
        param_values.push(Box::new(name.clone()));
        idx += 1;
    }

    if let Some(session_id) = filter.session_id {
        clauses.push(format!("session_id = ?{idx}"));
        param_values.push(Box::new(session_id.to_string()));
        idx += 1;
    }

    if let Some(ref device_id) = filter.device_id {
        clauses.push(format!("device_id = ?{idx}"));
        param_values.push(Box::new(device_id.clone()));
        idx += 1;
    }

    if let Some(outcome) = filter.outcome {
        clauses.push(format!("outcome = ?{idx}"));
        param_values.push(Box::new(outcome.as_str()));
        idx += 1;
    }

    if let Some(since) = filter.since {
        clauses.push(format!("started_at >= ?{idx}"));
        param_values.push(Box::new(timestamp(since)));
        idx += 1;
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT span_id, name, session_id, device_id, attempt, started_at, ended_at, outcome,
                latency_ms, score, matched_index, transcript_chars, detail
         FROM trace_spans
         {where_clause}
         ORDER BY seq ASC
         LIMIT ?{idx}"
    );
    param_values.push(Box::new(filter.limit.unwrap_or(100)));

    let params_refs: Vec<&dyn rusqlite::types::ToSql> = param_values.iter().map(|p| &**p).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), RawSpan::from_row)?;

    let mut spans = Vec::new();
    for row in rows {
        spans.push(row?.into_record()?);
    }
    Ok(spans)
}

fn find_span(conn: &Connection, span_id: Uuid) -> Result<Option<SpanRecord>, TraceError> {
    conn.query_row(
        "SELECT span_id, name, session_id, device_id, attempt, started_at, ended_at, outcome,
                latency_ms, score, matched_index, transcript_chars, detail
         FROM trace_spans WHERE span_id = ?1",
        [span_id.to_string()],
        RawSpan::from_row,
    )
    .optional()?
    .map(RawSpan::into_record)
    .transpose()
}

/// A row as SQLite returns it, before text columns are parsed.
struct RawSpan {
    span_id: String,
    name: String,
    session_id: Option<String>,
    device_id: String,
    attempt: Option<u32>,
    started_at: String,
    ended_at: Option<String>,
    outcome: Option<String>,
    latency_ms: Option<i64>,
    score: Option<f64>,
    matched_index: Option<i64>,
    transcript_chars: Option<i64>,
    detail: Option<String>,
}

impl RawSpan {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            span_id: row.get(0)?,
            name: row.get(1)?,
            session_id: row.get(2)?,
            device_id: row.get(3)?,
            attempt: row.get(4)?,
            started_at: row.get(5)?,
            ended_at: row.get(6)?,
            outcome: row.get(7)?,
            latency_ms: row.get(8)?,
            score: row.get(9)?,
            matched_index: row.get(10)?,
            transcript_chars: row.get(11)?,
            detail: row.get(12)?,
        })
    }

    fn into_record(self) -> Result<SpanRecord, TraceError> {
        let parse_uuid = |raw: &str| {
            Uuid::parse_str(raw).map_err(|e| TraceError::Corrupt(format!("bad uuid {raw:?}: {e}")))
        };

        Ok(SpanRecord {
            span_id: parse_uuid(&self.span_id)?,
            name: self.name,
            metadata: SpanMetadata {
                session_id: self.session_id.as_deref().map(parse_uuid).transpose()?,
                device_id: self.device_id,
                attempt: self.attempt,
            },
            started_at: parse_timestamp(&self.started_at)?,
            ended_at: self.ended_at.as_deref().map(parse_timestamp).transpose()?,
            outcome: self
                .outcome
                .as_deref()
                .map(|raw| raw.parse::<SpanOutcome>())
                .transpose()
                .map_err(|e| TraceError::Corrupt(e.to_string()))?,
            metrics: SpanMetrics {
                latency_ms: self.latency_ms.unwrap_or(0).max(0) as u64,
                score: self.score,
                matched_index: self.matched_index.map(|i| i as usize),
                transcript_chars: self.transcript_chars.map(|n| n as usize),
                detail: self.detail,
            },
        })
    }
}
