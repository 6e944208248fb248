//! AMQP queue consumer
//!
//! Consumes the events queue with manual acknowledgement. Every delivery is
//! wrapped in a [`ConsumedMessage`] whose acker is bound to that delivery's tag
//! and handed to the [`DeliveryHandler`] on its own task. The prefetch limit
//! bounds how many of those tasks are alive at once.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    acker::Acker,
    message::Delivery,
    options::*,
    types::{AMQPValue, FieldTable},
    Channel,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tl_common::{HeaderValue, MessageHeaders};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::connection::AmqpConnectionManager;
use crate::{ConsumedMessage, DeliveryAcker, DeliveryHandler, QueueConsumer, QueueError, Result};

/// Configuration for the AMQP consumer
#[derive(Debug, Clone)]
pub struct AmqpConsumerConfig {
    pub queue_name: String,
    pub consumer_tag: String,
    pub prefetch_count: u16,
}

impl Default for AmqpConsumerConfig {
    fn default() -> Self {
        Self {
            queue_name: "tigertms.events.q".to_string(),
            consumer_tag: format!("tl-consumer-{}", uuid::Uuid::new_v4().simple()),
            prefetch_count: 20,
        }
    }
}

impl AmqpConsumerConfig {
    pub fn from_rabbit(config: &tl_config::RabbitConfig) -> Self {
        Self {
            queue_name: config.queues.events.clone(),
            prefetch_count: config.prefetch_count,
            ..Default::default()
        }
    }
}

pub struct AmqpConsumer {
    config: AmqpConsumerConfig,
    connection: Arc<AmqpConnectionManager>,
    channel: RwLock<Option<Channel>>,
    running: AtomicBool,
    in_flight: Arc<AtomicU32>,
}

impl AmqpConsumer {
    /// The consumer gets its own connection manager so consumption never
    /// shares a connection with publishing.
    pub fn new(config: AmqpConsumerConfig, connection: Arc<AmqpConnectionManager>) -> Self {
        Self {
            config,
            connection,
            channel: RwLock::new(None),
            running: AtomicBool::new(false),
            in_flight: Arc::new(AtomicU32::new(0)),
        }
    }

    async fn open(&self) -> Result<lapin::Consumer> {
        let channel = self.connection.create_channel().await?;

        channel
            .basic_qos(self.config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| QueueError::Channel(format!("Failed to set QoS: {}", e)))?;

        let consumer = channel
            .basic_consume(
                &self.config.queue_name,
                &self.config.consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::Channel(format!("Failed to start consumer: {}", e)))?;

        *self.channel.write().await = Some(channel);
        Ok(consumer)
    }

    fn dispatch(&self, delivery: Delivery, handler: &Arc<dyn DeliveryHandler>) {
        let Delivery {
            delivery_tag,
            data,
            properties,
            acker,
            ..
        } = delivery;

        let headers = decode_headers(properties.headers().as_ref());
        let acker = Arc::new(AmqpAcker::new(acker, delivery_tag));
        let message = ConsumedMessage::new(data, headers, acker);

        debug!(
            queue = %self.config.queue_name,
            delivery_tag = delivery_tag,
            "Received delivery"
        );

        let handler = handler.clone();
        spawn_tracked(&self.in_flight, async move {
            handler.on_message(message).await;
        });
    }
}

#[async_trait]
impl QueueConsumer for AmqpConsumer {
    fn identifier(&self) -> &str {
        &self.config.queue_name
    }

    async fn start(
        &self,
        handler: Arc<dyn DeliveryHandler>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let mut consumer = self.open().await?;
        self.running.store(true, Ordering::SeqCst);

        info!(
            queue = %self.config.queue_name,
            prefetch = self.config.prefetch_count,
            "AMQP consumer started"
        );

        let outcome = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(queue = %self.config.queue_name, "Consumer received shutdown signal");
                    break Ok(());
                }
                next = consumer.next() => match next {
                    Some(Ok(delivery)) => self.dispatch(delivery, &handler),
                    Some(Err(e)) => {
                        error!(queue = %self.config.queue_name, error = %e, "Error receiving delivery");
                        break Err(QueueError::Channel(e.to_string()));
                    }
                    None => {
                        warn!(queue = %self.config.queue_name, "Consumer stream ended");
                        break Err(QueueError::StreamEnded);
                    }
                },
            }
        };

        self.running.store(false, Ordering::SeqCst);
        outcome
    }

    fn is_healthy(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(channel) = self.channel.write().await.take() {
            let _ = channel
                .basic_cancel(&self.config.consumer_tag, BasicCancelOptions::default())
                .await;
            let _ = channel.close(200, "Shutdown").await;
        }

        self.connection.close().await;

        info!(queue = %self.config.queue_name, "AMQP consumer stopped");
    }
}

/// Decrements the in-flight count when a delivery task ends, panics included.
struct InFlightGuard(Arc<AtomicU32>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Spawn a delivery task counted in `in_flight` until it completes.
fn spawn_tracked<F>(in_flight: &Arc<AtomicU32>, task: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    in_flight.fetch_add(1, Ordering::SeqCst);
    let guard = InFlightGuard(in_flight.clone());
    tokio::spawn(async move {
        let _guard = guard;
        task.await;
    })
}

/// Settles a single delivery on the channel it arrived on.
pub struct AmqpAcker {
    acker: Acker,
    delivery_tag: u64,
}

impl AmqpAcker {
    pub fn new(acker: Acker, delivery_tag: u64) -> Self {
        Self { acker, delivery_tag }
    }
}

#[async_trait]
impl DeliveryAcker for AmqpAcker {
    async fn ack(&self) -> Result<()> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| QueueError::Channel(format!("ACK of delivery {} failed: {}", self.delivery_tag, e)))
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        self.acker
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await
            .map(|_| ())
            .map_err(|e| QueueError::Channel(format!("NACK of delivery {} failed: {}", self.delivery_tag, e)))
    }
}

/// Convert AMQP headers into [`MessageHeaders`].
pub fn decode_headers(table: Option<&FieldTable>) -> MessageHeaders {
    let mut headers = MessageHeaders::new();
    if let Some(table) = table {
        for (key, value) in table.inner() {
            headers.set(key.as_str(), decode_value(value));
        }
    }
    headers
}

fn decode_value(value: &AMQPValue) -> HeaderValue {
    match value {
        AMQPValue::ShortString(s) => HeaderValue::Str(s.as_str().to_string()),
        AMQPValue::LongString(s) => HeaderValue::Str(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        AMQPValue::ByteArray(b) => HeaderValue::Str(String::from_utf8_lossy(b.as_slice()).into_owned()),
        AMQPValue::ShortShortInt(i) => HeaderValue::Int(*i as i64),
        AMQPValue::ShortShortUInt(i) => HeaderValue::Int(*i as i64),
        AMQPValue::ShortInt(i) => HeaderValue::Int(*i as i64),
        AMQPValue::ShortUInt(i) => HeaderValue::Int(*i as i64),
        AMQPValue::LongInt(i) => HeaderValue::Int(*i as i64),
        AMQPValue::LongUInt(i) => HeaderValue::Int(*i as i64),
        AMQPValue::LongLongInt(i) => HeaderValue::Int(*i),
        AMQPValue::Boolean(b) => HeaderValue::Str(if *b { "True" } else { "False" }.to_string()),
        // anything else travels as an opaque string
        other => HeaderValue::Str(format!("{:?}", other)),
    }
}

/// Convert [`MessageHeaders`] into an AMQP field table.
pub fn encode_headers(headers: &MessageHeaders) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in headers.iter() {
        let value = match value {
            HeaderValue::Str(s) => AMQPValue::LongString(s.as_str().into()),
            HeaderValue::Int(i) => AMQPValue::LongLongInt(*i),
        };
        table.insert(key.into(), value);
    }
    table
}
