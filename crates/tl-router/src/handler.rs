//! Event handlers
//!
//! `CheckInHandler` drives one check-in delivery through
//! duplicate check, payload validation, credential check, the Tiger call and the
//! PMS callback. Any failure republishes the original body to a retry tier (or the
//! dead queue) and acks the original delivery. The handler owns settling: every
//! path ends in exactly one ack or nack.

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tl_common::{RetryRoute, HEADER_ATTEMPT, HEADER_EVENT_TYPE, HEADER_LAST_ERROR, HEADER_WS_USER_KEY};
use tl_queue::EventPublisher;
use tracing::{debug, error, info, warn};

use crate::context::EventContext;
use crate::event_log::{EventLogEntry, EventLogSink};
use crate::idempotency::IdempotencyStore;
use crate::payload::CheckInPayload;
use crate::pms::{PmsCallbackClient, PmsCallbackRequest};
use crate::retry::RetryRouter;
use crate::router_metrics;
use crate::soap::build_inner_xml;
use crate::tiger::TigerClient;
use crate::HandlerError;

pub const CHECKIN_EVENT_TYPE: &str = "CHECKIN";

/// Business handler for one event type.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> &str;

    /// Process one delivery. Must settle `ctx` exactly once.
    async fn handle(&self, ctx: EventContext);
}

/// How a delivery left the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Duplicate,
    Processed,
    Republished(RetryRoute),
}

impl HandleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleOutcome::Duplicate => "duplicate",
            HandleOutcome::Processed => "processed",
            HandleOutcome::Republished(RetryRoute::Dead) => "dead_lettered",
            HandleOutcome::Republished(_) => "retried",
        }
    }
}

pub struct CheckInHandler {
    tiger: Arc<dyn TigerClient>,
    pms: Arc<dyn PmsCallbackClient>,
    store: Arc<dyn IdempotencyStore>,
    publisher: Arc<dyn EventPublisher>,
    event_log: Arc<dyn EventLogSink>,
    router: RetryRouter,
    ttl: Duration,
}

impl CheckInHandler {
    pub fn new(
        tiger: Arc<dyn TigerClient>,
        pms: Arc<dyn PmsCallbackClient>,
        store: Arc<dyn IdempotencyStore>,
        publisher: Arc<dyn EventPublisher>,
        event_log: Arc<dyn EventLogSink>,
        ttl: Duration,
    ) -> Self {
        Self {
            tiger,
            pms,
            store,
            publisher,
            event_log,
            router: RetryRouter::new(),
            ttl,
        }
    }

    async fn process(
        &self,
        ctx: &EventContext,
        entry: &mut EventLogEntry,
    ) -> Result<HandleOutcome, HandlerError> {
        if self.store.seen_recently(&ctx.hotel_id, &ctx.event_id) {
            entry.action("DUPLICATE");
            entry.warn("Duplicate delivery seen recently, acknowledging").await;
            self.settle(ctx).await?;
            return Ok(HandleOutcome::Duplicate);
        }

        let attempt = ctx.headers.get_int(HEADER_ATTEMPT, 0);
        entry.attempt(attempt);
        info!(
            hotel_id = %ctx.hotel_id,
            event_id = %ctx.event_id,
            attempt,
            "Handling check-in"
        );

        let payload = match CheckInPayload::from_slice(&ctx.body) {
            Ok(payload) => payload,
            Err(e) => {
                let reason = format!("Invalid payload: {}", e);
                entry.action("INVALID_PAYLOAD").reason(&reason);
                entry.error("Invalid payload, dead-lettering", Some(&e)).await;
                return self.republish_and_ack(ctx, attempt, &reason, true).await;
            }
        };
        entry.reservation(&payload.reservation_number, &payload.room);
        debug!(
            resno = %payload.reservation_number,
            room = %payload.room,
            viewbill = ?payload.viewbill,
            expressco = ?payload.expressco,
            "Check-in payload parsed"
        );

        let ws_user_key = match ctx.headers.get_non_blank(HEADER_WS_USER_KEY) {
            Some(key) => key,
            None => {
                let reason = "Missing wsuserkey";
                entry.action("MISSING_WSUSERKEY").reason(reason);
                entry.warn("Missing wsuserkey, scheduling retry").await;
                return self.republish_and_ack(ctx, attempt, reason, false).await;
            }
        };

        let inner_xml = build_inner_xml(
            &payload.reservation_number,
            &payload.site,
            &payload.room,
            &ws_user_key,
            &payload.optional_nodes(),
        );

        entry.action("SENT_TO_TIGER");
        let tiger = entry
            .timed_with("Tiger check-in call", self.tiger.send_check_in(&inner_xml), |r| r.success)
            .await;
        entry.tiger_response(&tiger.raw);

        if !tiger.success {
            let reason = tiger.reason.as_deref().unwrap_or("Tiger failed");
            entry.action("TIGER_FAILED").reason(reason);
            entry.warn("Tiger rejected check-in, scheduling retry").await;
            return self.republish_and_ack(ctx, attempt, reason, false).await;
        }

        let request = PmsCallbackRequest {
            hotel_id: ctx.hotel_id.clone(),
            event_id: ctx.event_id.clone(),
            event_type: ctx.headers.get_string(HEADER_EVENT_TYPE, CHECKIN_EVENT_TYPE),
            tiger_status: "SUCCESS".to_string(),
            tiger_reason: None,
            correlation_id: ctx.correlation_id.clone(),
        };

        entry.action("PMS_CALLBACK");
        let delivered = entry
            .timed_with("PMS callback", self.pms.notify(&request), |ok| *ok)
            .await;

        if !delivered {
            let reason = "Callback PMS failed";
            entry.action("CALLBACK_FAILED").reason(reason);
            entry.warn("PMS callback failed, scheduling retry").await;
            return self.republish_and_ack(ctx, attempt, reason, false).await;
        }

        self.store.mark_seen(&ctx.hotel_id, &ctx.event_id, self.ttl);
        entry.action("DONE");
        entry.info("Check-in delivered, acknowledging").await;
        self.settle(ctx).await?;
        Ok(HandleOutcome::Processed)
    }

    async fn republish_and_ack(
        &self,
        ctx: &EventContext,
        attempt: i64,
        reason: &str,
        force_dead: bool,
    ) -> Result<HandleOutcome, HandlerError> {
        let route = self
            .republish(ctx, attempt, reason, force_dead)
            .await
            .map_err(HandlerError::Republish)?;
        self.settle(ctx).await?;
        Ok(HandleOutcome::Republished(route))
    }

    /// Publish the original body to the retry exchange with `x-attempt` bumped
    /// by one and `x-last-error` set to `reason`.
    async fn republish(
        &self,
        ctx: &EventContext,
        attempt: i64,
        reason: &str,
        force_dead: bool,
    ) -> tl_queue::Result<RetryRoute> {
        let next_attempt = attempt.saturating_add(1);

        let mut headers = ctx.headers.clone();
        headers.set(HEADER_ATTEMPT, next_attempt);
        headers.set(HEADER_LAST_ERROR, reason);

        let route = if force_dead {
            RetryRoute::Dead
        } else {
            self.router.decide(next_attempt).route
        };
        let routing_key = self.publisher.routing_key_for(route);

        debug!(
            event_id = %ctx.event_id,
            next_attempt,
            route = %route,
            routing_key = %routing_key,
            "Republishing delivery"
        );

        self.publisher
            .publish_to_retry(&ctx.body, &headers, &routing_key)
            .await?;
        router_metrics::record_republish(route);
        Ok(route)
    }

    async fn settle(&self, ctx: &EventContext) -> Result<(), HandlerError> {
        ctx.ack().await.map_err(HandlerError::Settle)
    }

    /// Last-resort path: dead-letter the delivery, or hand it back to the broker
    /// when even that publish fails.
    async fn recover(&self, ctx: &EventContext, entry: &mut EventLogEntry, failure: HandlerError) {
        entry.action("UNHANDLED");
        entry
            .error("Unhandled failure while processing check-in", Some(&failure))
            .await;

        if ctx.is_settled() {
            warn!(event_id = %ctx.event_id, "Delivery already settled, nothing to recover");
            router_metrics::record_delivery("failed");
            return;
        }

        let attempt = ctx.headers.get_int(HEADER_ATTEMPT, 0);
        let reason = format!("Unhandled: {}", failure);

        match self.republish(ctx, attempt, &reason, true).await {
            Ok(_) => {
                if let Err(e) = ctx.ack().await {
                    error!(event_id = %ctx.event_id, error = %e, "Ack after dead-letter failed");
                }
                router_metrics::record_delivery(HandleOutcome::Republished(RetryRoute::Dead).as_str());
            }
            Err(e) => {
                error!(
                    event_id = %ctx.event_id,
                    error = %e,
                    "Dead-letter publish failed, returning delivery to the broker"
                );
                if let Err(e) = ctx.nack(true).await {
                    error!(event_id = %ctx.event_id, error = %e, "Nack failed");
                }
                router_metrics::record_delivery("requeued");
            }
        }
    }
}

#[async_trait]
impl EventHandler for CheckInHandler {
    fn event_type(&self) -> &str {
        CHECKIN_EVENT_TYPE
    }

    async fn handle(&self, ctx: EventContext) {
        let mut entry = EventLogEntry::from_context(self.event_log.clone(), &ctx);
        entry.event_type(CHECKIN_EVENT_TYPE);

        let result = AssertUnwindSafe(self.process(&ctx, &mut entry))
            .catch_unwind()
            .await;

        let failure = match result {
            Ok(Ok(outcome)) => {
                router_metrics::record_delivery(outcome.as_str());
                return;
            }
            Ok(Err(e)) => e,
            Err(panic) => HandlerError::Panicked(panic_message(panic)),
        };

        self.recover(&ctx, &mut entry, failure).await;
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
