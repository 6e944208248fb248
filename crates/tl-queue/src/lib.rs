use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tl_common::{MessageHeaders, RetryRoute};
use tokio::sync::broadcast;

pub mod connection;
pub mod consumer;
pub mod error;
pub mod publisher;
pub mod topology;

pub use connection::AmqpConnectionManager;
pub use consumer::{AmqpAcker, AmqpConsumer, AmqpConsumerConfig};
pub use error::QueueError;
pub use publisher::ReliablePublisher;
pub use topology::Topology;

pub type Result<T> = std::result::Result<T, QueueError>;

/// Settles one broker delivery.
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    /// Terminal success; the broker forgets the delivery.
    async fn ack(&self) -> Result<()>;

    /// Reject the delivery, optionally asking the broker to redeliver it.
    async fn nack(&self, requeue: bool) -> Result<()>;

    /// Whether a settle has already been attempted. Only guarded ackers know.
    fn is_settled(&self) -> bool {
        false
    }
}

/// Wraps an acker so only the first settle reaches the broker.
pub struct SettleOnce {
    inner: Arc<dyn DeliveryAcker>,
    settled: AtomicBool,
}

impl SettleOnce {
    pub fn new(inner: Arc<dyn DeliveryAcker>) -> Self {
        Self {
            inner,
            settled: AtomicBool::new(false),
        }
    }

    fn claim(&self) -> Result<()> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(QueueError::AlreadySettled);
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryAcker for SettleOnce {
    async fn ack(&self) -> Result<()> {
        self.claim()?;
        self.inner.ack().await
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        self.claim()?;
        self.inner.nack(requeue).await
    }

    fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }
}

/// One broker delivery: body, headers and the means to settle it.
pub struct ConsumedMessage {
    pub body: Bytes,
    pub headers: MessageHeaders,
    acker: Arc<SettleOnce>,
}

impl ConsumedMessage {
    pub fn new(body: impl Into<Bytes>, headers: MessageHeaders, acker: Arc<dyn DeliveryAcker>) -> Self {
        Self {
            body: body.into(),
            headers,
            acker: Arc::new(SettleOnce::new(acker)),
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

    /// Settle-once acker for handing to the business layer.
    pub fn acker(&self) -> Arc<dyn DeliveryAcker> {
        self.acker.clone()
    }
}

impl std::fmt::Debug for ConsumedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumedMessage")
            .field("body_len", &self.body.len())
            .field("headers", &self.headers)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Receives every delivery a consumer pulls off the queue.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn on_message(&self, message: ConsumedMessage);
}

/// Trait for consuming deliveries from a queue
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    fn identifier(&self) -> &str;

    /// Consume until `shutdown` fires or the broker stream ends.
    ///
    /// Returns `Ok(())` on shutdown and `QueueError::StreamEnded` when the broker
    /// closed the stream, so a supervisor can decide to restart.
    async fn start(
        &self,
        handler: Arc<dyn DeliveryHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<()>;

    fn is_healthy(&self) -> bool;

    /// Deliveries handed to the handler that have not finished yet.
    fn in_flight(&self) -> u32 {
        0
    }

    /// Cancel consumption and close the broker resources; errors are ignored.
    async fn stop(&self);
}

/// Trait for publishing events and retries with broker confirmation
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish to the events exchange under the events routing key.
    async fn publish(&self, body: &[u8], headers: &MessageHeaders) -> Result<()>;

    /// Publish to the retry exchange under `routing_key`.
    async fn publish_to_retry(
        &self,
        body: &[u8],
        headers: &MessageHeaders,
        routing_key: &str,
    ) -> Result<()>;

    /// Routing key on the retry exchange for a retry tier.
    fn routing_key_for(&self, route: RetryRoute) -> String;
}
