//! Tigerlink Event Router
//!
//! This crate provides the event-delivery pipeline with:
//! - MessageOrchestrator: Dispatches consumed deliveries to registered handlers
//! - CheckInHandler: Check-in state machine with retry tiering and dead-lettering
//! - RetryRouter: Attempt count to retry tier staircase
//! - IdempotencyStore: Duplicate delivery suppression with TTL
//! - Tiger and PMS clients: SOAP check-in and outcome callback
//! - EventLog: Per-event structured records (Elasticsearch or no-op)
//! - QueueWorker: Supervises the queue consumer
//! - API: HTTP ingress, health and metrics

pub mod error;
pub mod retry;
pub mod idempotency;
pub mod soap;
pub mod payload;
pub mod context;
pub mod event_log;
pub mod tiger;
pub mod pms;
pub mod router_metrics;
pub mod handler;
pub mod registry;
pub mod orchestrator;
pub mod worker;
pub mod api;

pub use error::{HandlerError, RouterError};
pub use retry::{RetryDecision, RetryRouter};
pub use idempotency::{IdempotencyStore, MemoryIdempotencyStore};
pub use payload::{CheckInPayload, PayloadError};
pub use context::EventContext;
pub use event_log::{
    create_event_log_sink, ElasticEventLogSink, EventLogEntry, EventLogRecord, EventLogSink,
    NoOpEventLogSink,
};
pub use tiger::{HttpTigerClient, TigerClient, TigerResult};
pub use pms::{HttpPmsCallbackClient, PmsCallbackClient, PmsCallbackRequest};
pub use handler::{CheckInHandler, EventHandler, HandleOutcome, CHECKIN_EVENT_TYPE};
pub use registry::EventHandlerRegistry;
pub use orchestrator::MessageOrchestrator;
pub use worker::QueueWorker;

pub type Result<T> = std::result::Result<T, RouterError>;
