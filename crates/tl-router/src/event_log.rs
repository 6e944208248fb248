//! Event log - structured per-event records
//!
//! Provides:
//! - `EventLogEntry`, a builder scoped to one event that accumulates fields
//!   (ids, attempt, reservation, timings) and emits records as processing moves on
//! - `EventLogSink` implementations: no-op, and Elasticsearch via HTTP
//!
//! Every emitted record is also written as a `tracing` event, so the event log
//! is visible in the process logs even when no sink is configured.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tl_config::ElasticConfig;
use tracing::{error, info, warn};

use crate::context::EventContext;
use crate::{Result, RouterError};

pub const SERVICE_NAME: &str = "tigerlink";

const TIGER_RESPONSE_LIMIT: usize = 500;

/// Destination for event log records
#[async_trait]
pub trait EventLogSink: Send + Sync {
    /// Store one record. Sinks swallow their own failures.
    async fn post(&self, record: &EventLogRecord);

    fn is_enabled(&self) -> bool;
}

/// Sink used when the event log is switched off
pub struct NoOpEventLogSink;

#[async_trait]
impl EventLogSink for NoOpEventLogSink {
    async fn post(&self, _record: &EventLogRecord) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Indexes records into a daily Elasticsearch index (`{prefix}-yyyy.MM.dd`).
pub struct ElasticEventLogSink {
    client: reqwest::Client,
    uri: String,
    index_prefix: String,
}

impl ElasticEventLogSink {
    pub fn new(config: &ElasticConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .map_err(RouterError::Http)?;

        info!(uri = %config.uri, index_prefix = %config.index_prefix, "ElasticEventLogSink initialized");

        Ok(Self {
            client,
            uri: config.uri.trim_end_matches('/').to_string(),
            index_prefix: config.index_prefix.clone(),
        })
    }

    fn document_url(&self) -> String {
        format!(
            "{}/{}-{}/_doc/",
            self.uri,
            self.index_prefix,
            Utc::now().format("%Y.%m.%d")
        )
    }
}

#[async_trait]
impl EventLogSink for ElasticEventLogSink {
    async fn post(&self, record: &EventLogRecord) {
        let url = self.document_url();
        match self.client.post(&url).json(record).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                warn!(status, body = %body, "Event log POST to Elasticsearch rejected");
            }
            Err(e) => {
                warn!(error = %e, "Event log POST to Elasticsearch failed");
            }
        }
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Build the sink the configuration asks for.
pub fn create_event_log_sink(config: &ElasticConfig) -> Result<Arc<dyn EventLogSink>> {
    if !config.enabled {
        info!("Elasticsearch event log disabled - using NoOpEventLogSink");
        return Ok(Arc::new(NoOpEventLogSink));
    }
    Ok(Arc::new(ElasticEventLogSink::new(config)?))
}

/// One event log document.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct EventLogRecord {
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub service: &'static str,
    #[serde(rename = "hotelId", skip_serializing_if = "Option::is_none")]
    pub hotel_id: Option<String>,
    #[serde(rename = "eventId", skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(rename = "correlationId", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(rename = "eventType", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "reservationNumber", skip_serializing_if = "Option::is_none")]
    pub reservation_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiger_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Scoped builder for the records of one event.
///
/// Setters only fill a field when given a non-empty value, and fields stick
/// across emits, so later records carry everything learned so far.
pub struct EventLogEntry {
    sink: Arc<dyn EventLogSink>,
    record: EventLogRecord,
}

impl EventLogEntry {
    pub fn new(sink: Arc<dyn EventLogSink>) -> Self {
        Self {
            sink,
            record: EventLogRecord {
                service: SERVICE_NAME,
                ..Default::default()
            },
        }
    }

    pub fn from_context(sink: Arc<dyn EventLogSink>, ctx: &EventContext) -> Self {
        let mut entry = Self::new(sink);
        entry
            .hotel_id(&ctx.hotel_id)
            .event_id(&ctx.event_id)
            .correlation_id(&ctx.correlation_id);
        entry
    }

    pub fn hotel_id(&mut self, value: &str) -> &mut Self {
        set_non_empty(&mut self.record.hotel_id, value);
        self
    }

    pub fn event_id(&mut self, value: &str) -> &mut Self {
        set_non_empty(&mut self.record.event_id, value);
        self
    }

    pub fn correlation_id(&mut self, value: &str) -> &mut Self {
        set_non_empty(&mut self.record.correlation_id, value);
        self
    }

    pub fn event_type(&mut self, value: &str) -> &mut Self {
        set_non_empty(&mut self.record.event_type, value);
        self
    }

    pub fn attempt(&mut self, attempt: i64) -> &mut Self {
        self.record.attempt = Some(attempt);
        self
    }

    pub fn reason(&mut self, value: &str) -> &mut Self {
        set_non_empty(&mut self.record.reason, value);
        self
    }

    pub fn reservation(&mut self, reservation_number: &str, room: &str) -> &mut Self {
        set_non_empty(&mut self.record.reservation_number, reservation_number);
        set_non_empty(&mut self.record.room, room);
        self
    }

    pub fn action(&mut self, value: &str) -> &mut Self {
        set_non_empty(&mut self.record.action, value);
        self
    }

    pub fn tiger_response(&mut self, raw: &str) -> &mut Self {
        let truncated: String = raw.chars().take(TIGER_RESPONSE_LIMIT).collect();
        set_non_empty(&mut self.record.tiger_response, &truncated);
        self
    }

    /// Snapshot of the fields gathered so far.
    pub fn record(&self) -> &EventLogRecord {
        &self.record
    }

    pub async fn info(&mut self, message: &str) {
        self.emit(Level::Info, message).await;
    }

    pub async fn warn(&mut self, message: &str) {
        self.emit(Level::Warn, message).await;
    }

    pub async fn error(&mut self, message: &str, err: Option<&(dyn std::error::Error + Send + Sync + 'static)>) {
        if let Some(err) = err {
            self.record.exception_type = Some(error_kind(err));
            self.record.exception_message = Some(err.to_string());
        }
        self.emit(Level::Error, message).await;
    }

    /// Await `operation`, recording when it started, how long it took and `success` status.
    pub async fn timed<F, T>(&mut self, message: &str, operation: F) -> T
    where
        F: Future<Output = T>,
    {
        self.timed_with(message, operation, |_| true).await
    }

    /// Like [`timed`](Self::timed), with `succeeded` deciding the status.
    /// A failed outcome is emitted at `WARN`.
    pub async fn timed_with<F, T, S>(&mut self, message: &str, operation: F, succeeded: S) -> T
    where
        F: Future<Output = T>,
        S: Fn(&T) -> bool,
    {
        let started_at = Utc::now();
        let clock = Instant::now();
        let outcome = operation.await;
        let elapsed = clock.elapsed();

        let ok = succeeded(&outcome);
        self.record.started_at = Some(started_at.to_rfc3339_opts(SecondsFormat::Millis, true));
        self.record.end_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        self.record.duration_ms = Some(elapsed.as_millis() as u64);
        self.record.status = Some(if ok { "success" } else { "error" }.to_string());

        let level = if ok { Level::Info } else { Level::Warn };
        self.emit(level, message).await;
        outcome
    }

    async fn emit(&mut self, level: Level, message: &str) {
        self.record.timestamp = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        self.record.level = Some(level.as_str().to_string());
        self.record.message = Some(message.to_string());

        let r = &self.record;
        let hotel_id = r.hotel_id.as_deref().unwrap_or("");
        let event_id = r.event_id.as_deref().unwrap_or("");
        let action = r.action.as_deref().unwrap_or("");
        let reason = r.reason.as_deref().unwrap_or("");
        match level {
            Level::Info => info!(hotel_id, event_id, attempt = ?r.attempt, action, duration_ms = ?r.duration_ms, "{}", message),
            Level::Warn => warn!(hotel_id, event_id, attempt = ?r.attempt, action, reason, "{}", message),
            Level::Error => error!(
                hotel_id,
                event_id,
                attempt = ?r.attempt,
                action,
                exception = r.exception_message.as_deref().unwrap_or(""),
                "{}",
                message
            ),
        }

        self.sink.post(&self.record).await;
    }
}

fn set_non_empty(slot: &mut Option<String>, value: &str) {
    if !value.is_empty() {
        *slot = Some(value.to_string());
    }
}

/// Variant-level name of an error, taken from its `Debug` rendering.
fn error_kind(err: &(dyn std::error::Error + 'static)) -> String {
    let debug = format!("{:?}", err);
    debug
        .split(|c: char| c == '(' || c == '{' || c == ' ')
        .next()
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CapturingSink {
        records: Mutex<Vec<EventLogRecord>>,
    }

    #[async_trait]
    impl EventLogSink for CapturingSink {
        async fn post(&self, record: &EventLogRecord) {
            self.records.lock().push(record.clone());
        }

        fn is_enabled(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_fields_accumulate_across_emits() {
        let sink = Arc::new(CapturingSink::default());
        let mut entry = EventLogEntry::new(sink.clone());
        entry.hotel_id("H1").event_id("E1").event_type("CHECKIN").attempt(2);
        entry.info("start").await;
        entry.reservation("R1", "101").reason("boom");
        entry.warn("failed").await;

        let records = sink.records.lock();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level.as_deref(), Some("INFO"));
        assert_eq!(records[0].reservation_number, None);
        assert_eq!(records[1].level.as_deref(), Some("WARN"));
        assert_eq!(records[1].reservation_number.as_deref(), Some("R1"));
        assert_eq!(records[1].attempt, Some(2));
    }

    #[tokio::test]
    async fn test_empty_values_do_not_overwrite() {
        let sink = Arc::new(CapturingSink::default());
        let mut entry = EventLogEntry::new(sink);
        entry.correlation_id("C1").correlation_id("");
        assert_eq!(entry.record().correlation_id.as_deref(), Some("C1"));
    }

    #[tokio::test]
    async fn test_tiger_response_is_truncated() {
        let mut entry = EventLogEntry::new(Arc::new(NoOpEventLogSink));
        entry.tiger_response(&"x".repeat(2000));
        assert_eq!(entry.record().tiger_response.as_ref().map(|s| s.len()), Some(500));
    }

    #[tokio::test]
    async fn test_timed_records_duration_and_status() {
        let sink = Arc::new(CapturingSink::default());
        let mut entry = EventLogEntry::new(sink.clone());

        let value = entry
            .timed_with(
                "call",
                async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    false
                },
                |ok| *ok,
            )
            .await;
        assert!(!value);

        let records = sink.records.lock();
        let record = &records[0];
        assert_eq!(record.status.as_deref(), Some("error"));
        assert_eq!(record.level.as_deref(), Some("WARN"));
        assert!(record.duration_ms.is_some());
        assert!(record.started_at.is_some() && record.end_at.is_some());
    }

    #[tokio::test]
    async fn test_error_records_exception() {
        let sink = Arc::new(CapturingSink::default());
        let mut entry = EventLogEntry::new(sink.clone());
        let err = crate::HandlerError::Panicked("kaboom".to_string());
        entry.error("unhandled", Some(&err)).await;

        let records = sink.records.lock();
        assert_eq!(records[0].exception_type.as_deref(), Some("Panicked"));
        assert_eq!(records[0].exception_message.as_deref(), Some("Handler panicked: kaboom"));
    }

    #[test]
    fn test_serialized_field_names() {
        let record = EventLogRecord {
            timestamp: Some("2026-01-01T00:00:00.000Z".into()),
            service: SERVICE_NAME,
            hotel_id: Some("H1".into()),
            reservation_number: Some("R1".into()),
            duration_ms: Some(12),
            ..Default::default()
        };
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["@timestamp"], "2026-01-01T00:00:00.000Z");
        assert_eq!(json["hotelId"], "H1");
        assert_eq!(json["reservationNumber"], "R1");
        assert_eq!(json["duration_ms"], 12);
        assert_eq!(json["service"], "tigerlink");
        assert!(json.get("eventId").is_none());
        assert!(json.get("exception_type").is_none());
    }
}
