use bytes::Bytes;
use std::sync::Arc;
use tl_common::MessageHeaders;
use tl_queue::{DeliveryAcker, Result};

/// Per-delivery view handed to an event handler.
///
/// Built by the orchestrator for exactly one delivery and dropped when the
/// handler returns. The handler owns settling it.
pub struct EventContext {
    pub hotel_id: String,
    pub event_id: String,
    pub correlation_id: String,
    pub headers: MessageHeaders,
    pub body: Bytes,
    acker: Arc<dyn DeliveryAcker>,
}

impl EventContext {
    pub fn new(
        hotel_id: impl Into<String>,
        event_id: impl Into<String>,
        correlation_id: impl Into<String>,
        headers: MessageHeaders,
        body: Bytes,
        acker: Arc<dyn DeliveryAcker>,
    ) -> Self {
        Self {
            hotel_id: hotel_id.into(),
            event_id: event_id.into(),
            correlation_id: correlation_id.into(),
            headers,
            body,
            acker,
        }
    }

    pub async fn ack(&self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn nack(&self, requeue: bool) -> Result<()> {
        self.acker.nack(requeue).await
    }

    pub fn is_settled(&self) -> bool {
        self.acker.is_settled()
    }
}

impl std::fmt::Debug for EventContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventContext")
            .field("hotel_id", &self.hotel_id)
            .field("event_id", &self.event_id)
            .field("correlation_id", &self.correlation_id)
            .field("body_len", &self.body.len())
            .finish()
    }
}
