//! Dispatch of consumed deliveries to event handlers.

use async_trait::async_trait;
use std::sync::Arc;
use tl_common::{HEADER_CORRELATION_ID, HEADER_EVENT_ID, HEADER_EVENT_TYPE, HEADER_HOTEL_ID};
use tl_queue::{ConsumedMessage, DeliveryHandler};
use tracing::{error, info_span, warn, Instrument};

use crate::context::EventContext;
use crate::registry::EventHandlerRegistry;
use crate::router_metrics;

/// Routes each delivery to the handler registered for its `x-event-type`.
///
/// Deliveries that cannot be routed (missing identity headers or an unknown
/// event type) are acked and dropped so they never loop. Routed deliveries are
/// settled by the handler, never here.
pub struct MessageOrchestrator {
    registry: Arc<EventHandlerRegistry>,
}

impl MessageOrchestrator {
    pub fn new(registry: Arc<EventHandlerRegistry>) -> Self {
        Self { registry }
    }

    pub async fn process(&self, message: ConsumedMessage) {
        let hotel_id = message.headers.get_non_blank(HEADER_HOTEL_ID);
        let event_id = message.headers.get_non_blank(HEADER_EVENT_ID);
        let event_type = message.headers.get_non_blank(HEADER_EVENT_TYPE);

        let (hotel_id, event_id, event_type) = match (hotel_id, event_id, event_type) {
            (Some(h), Some(e), Some(t)) => (h, e, t),
            (h, e, t) => {
                warn!(
                    hotel_id = ?h,
                    event_id = ?e,
                    event_type = ?t,
                    "Missing required headers, acking to avoid a poison loop"
                );
                Self::drop_message(&message, "missing_headers").await;
                return;
            }
        };

        let Some(handler) = self.registry.get(&event_type) else {
            warn!(event_type = %event_type, "No handler for event type, acking");
            Self::drop_message(&message, "unknown_type").await;
            return;
        };

        let correlation_id = message.headers.get_string(HEADER_CORRELATION_ID, "");
        let span = info_span!(
            "event",
            hotel_id = %hotel_id,
            event_id = %event_id,
            event_type = %event_type,
            correlation_id = %correlation_id
        );

        let ctx = EventContext::new(
            hotel_id,
            event_id,
            correlation_id,
            message.headers.clone(),
            message.body.clone(),
            message.acker(),
        );

        handler.handle(ctx).instrument(span).await;
    }

    async fn drop_message(message: &ConsumedMessage, outcome: &str) {
        if let Err(e) = message.ack().await {
            error!(error = %e, "Failed to ack dropped delivery");
        }
        router_metrics::record_delivery(outcome);
    }
}

#[async_trait]
impl DeliveryHandler for MessageOrchestrator {
    async fn on_message(&self, message: ConsumedMessage) {
        self.process(message).await;
    }
}
