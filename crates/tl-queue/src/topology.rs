//! Broker topology declaration.
//!
//! Declares the durable exchanges and queues the pipeline relies on. The
//! delay tiers are optional: normally the broker team owns them, but for local
//! setups each tier can be declared as a TTL queue that dead-letters back into
//! the events exchange.

use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable},
    Channel, ExchangeKind,
};
use tl_common::RetryRoute;
use tl_config::RabbitConfig;
use tracing::info;

use crate::connection::AmqpConnectionManager;
use crate::publisher::routing_key_for;
use crate::{QueueError, Result};

/// A delay-tier queue to declare on the retry exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierQueue {
    pub queue: String,
    pub routing_key: String,
    pub ttl_ms: u64,
}

pub struct Topology<'a> {
    config: &'a RabbitConfig,
}

impl<'a> Topology<'a> {
    pub fn new(config: &'a RabbitConfig) -> Self {
        Self { config }
    }

    /// Declare exchanges, queues and bindings. Safe to call repeatedly.
    pub async fn ensure(&self, connection: &AmqpConnectionManager) -> Result<()> {
        let channel = connection.create_channel().await?;
        let outcome = self.declare(&channel).await;
        let _ = channel.close(200, "OK").await;
        outcome
    }

    /// Delay-tier queues derived from the configured routing keys.
    pub fn tier_queues(&self) -> Vec<TierQueue> {
        RetryRoute::TIERS
            .iter()
            .filter_map(|route| {
                let routing_key = routing_key_for(&self.config.routing_keys, *route);
                route.delay_seconds().map(|secs| TierQueue {
                    queue: format!("{}.{}", self.config.exchanges.retry, routing_key),
                    routing_key,
                    ttl_ms: secs * 1000,
                })
            })
            .collect()
    }

    async fn declare(&self, channel: &Channel) -> Result<()> {
        let exchanges = &self.config.exchanges;
        let queues = &self.config.queues;
        let keys = &self.config.routing_keys;

        declare_exchange(channel, &exchanges.events).await?;
        declare_exchange(channel, &exchanges.retry).await?;

        declare_queue(channel, &queues.events, FieldTable::default()).await?;
        bind(channel, &queues.events, &exchanges.events, &keys.events).await?;

        declare_queue(channel, &queues.dead, FieldTable::default()).await?;
        bind(channel, &queues.dead, &exchanges.retry, &keys.dead).await?;

        if self.config.declare_retry_queues {
            for tier in self.tier_queues() {
                let mut args = FieldTable::default();
                args.insert("x-message-ttl".into(), AMQPValue::LongLongInt(tier.ttl_ms as i64));
                args.insert(
                    "x-dead-letter-exchange".into(),
                    AMQPValue::LongString(exchanges.events.as_str().into()),
                );
                args.insert(
                    "x-dead-letter-routing-key".into(),
                    AMQPValue::LongString(keys.events.as_str().into()),
                );

                declare_queue(channel, &tier.queue, args).await?;
                bind(channel, &tier.queue, &exchanges.retry, &tier.routing_key).await?;
            }
        }

        info!(
            events_exchange = %exchanges.events,
            retry_exchange = %exchanges.retry,
            retry_queues = self.config.declare_retry_queues,
            "Broker topology ensured"
        );
        Ok(())
    }
}

async fn declare_exchange(channel: &Channel, name: &str) -> Result<()> {
    channel
        .exchange_declare(
            name,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| QueueError::Channel(format!("Exchange {} declare failed: {}", name, e)))
}

async fn declare_queue(channel: &Channel, name: &str, args: FieldTable) -> Result<()> {
    channel
        .queue_declare(
            name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            args,
        )
        .await
        .map(|_| ())
        .map_err(|e| QueueError::Channel(format!("Queue {} declare failed: {}", name, e)))
}

async fn bind(channel: &Channel, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
    channel
        .queue_bind(
            queue,
            exchange,
            routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| {
            QueueError::Channel(format!(
                "Binding {} -> {} ({}) failed: {}",
                exchange, queue, routing_key, e
            ))
        })
}
