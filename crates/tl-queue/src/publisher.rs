//! Reliable AMQP publisher
//!
//! Every publish opens its own channel on the shared connection, switches it to
//! confirm mode, sends a persistent message and waits a bounded time for the
//! broker's confirmation. A missing confirmation and an explicit rejection are
//! reported as different errors.

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions},
    publisher_confirm::Confirmation,
    BasicProperties, Channel,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tl_common::{MessageHeaders, RetryRoute};
use tl_config::{ExchangeNames, RabbitConfig, RoutingKeys};
use tracing::{debug, info, warn};

use crate::connection::AmqpConnectionManager;
use crate::consumer::encode_headers;
use crate::{EventPublisher, QueueError, Result};

const PERSISTENT: u8 = 2;

pub struct ReliablePublisher {
    connection: Arc<AmqpConnectionManager>,
    exchanges: ExchangeNames,
    routing_keys: RoutingKeys,
    confirm_timeout: Duration,
    stopped: AtomicBool,
}

impl ReliablePublisher {
    pub fn new(connection: Arc<AmqpConnectionManager>, config: &RabbitConfig) -> Self {
        Self {
            connection,
            exchanges: config.exchanges.clone(),
            routing_keys: config.routing_keys.clone(),
            confirm_timeout: config.confirm_timeout(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Refuse new publishes. One already waiting for its confirmation runs to completion.
    pub fn shutdown(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!("Reliable publisher stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn publish_confirmed(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        headers: &MessageHeaders,
    ) -> Result<()> {
        if self.is_stopped() {
            return Err(QueueError::Stopped);
        }

        let channel = self.connection.create_channel().await?;
        let outcome = self
            .send_on(&channel, exchange, routing_key, body, headers)
            .await;

        if let Err(e) = channel.close(200, "OK").await {
            debug!(error = %e, "Closing publish channel failed");
        }

        outcome
    }

    async fn send_on(
        &self,
        channel: &Channel,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        headers: &MessageHeaders,
    ) -> Result<()> {
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| QueueError::Channel(format!("Failed to enable confirms: {}", e)))?;

        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type("application/json".into())
            .with_headers(encode_headers(headers));

        let confirm = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await
            .map_err(|e| QueueError::Channel(format!("Publish failed: {}", e)))?;

        let confirmation = tokio::time::timeout(self.confirm_timeout, confirm)
            .await
            .map_err(|_| QueueError::ConfirmTimeout(self.confirm_timeout))?
            .map_err(|e| QueueError::Channel(format!("Publish confirm failed: {}", e)))?;

        match confirmation {
            Confirmation::Ack(_) => {
                debug!(exchange, routing_key, bytes = body.len(), "Publish confirmed");
                Ok(())
            }
            Confirmation::Nack(_) => {
                warn!(exchange, routing_key, "Broker rejected publish");
                Err(QueueError::Nacked {
                    routing_key: routing_key.to_string(),
                })
            }
            Confirmation::NotRequested => Err(QueueError::Channel(
                "confirm mode was not active on the publish channel".to_string(),
            )),
        }
    }
}

#[async_trait]
impl EventPublisher for ReliablePublisher {
    async fn publish(&self, body: &[u8], headers: &MessageHeaders) -> Result<()> {
        self.publish_confirmed(&self.exchanges.events, &self.routing_keys.events, body, headers)
            .await
    }

    async fn publish_to_retry(
        &self,
        body: &[u8],
        headers: &MessageHeaders,
        routing_key: &str,
    ) -> Result<()> {
        self.publish_confirmed(&self.exchanges.retry, routing_key, body, headers)
            .await
    }

    fn routing_key_for(&self, route: RetryRoute) -> String {
        routing_key_for(&self.routing_keys, route)
    }
}

/// Map a retry tier onto its configured routing key.
pub fn routing_key_for(keys: &RoutingKeys, route: RetryRoute) -> String {
    match route {
        RetryRoute::Retry10s => keys.retry_10s.clone(),
        RetryRoute::Retry1m => keys.retry_1m.clone(),
        RetryRoute::Retry5m => keys.retry_5m.clone(),
        RetryRoute::Retry30m => keys.retry_30m.clone(),
        RetryRoute::Dead => keys.dead.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher() -> ReliablePublisher {
        let config = RabbitConfig::default();
        let connection = Arc::new(AmqpConnectionManager::new(vec![], "tl-test"));
        ReliablePublisher::new(connection, &config)
    }

    #[test]
    fn test_routing_keys_per_tier() {
        let publisher = publisher();
        assert_eq!(publisher.routing_key_for(RetryRoute::Retry10s), "retry.10s");
        assert_eq!(publisher.routing_key_for(RetryRoute::Retry1m), "retry.1m");
        assert_eq!(publisher.routing_key_for(RetryRoute::Retry5m), "retry.5m");
        assert_eq!(publisher.routing_key_for(RetryRoute::Retry30m), "retry.30m");
        assert_eq!(publisher.routing_key_for(RetryRoute::Dead), "dead");
    }

    #[tokio::test]
    async fn test_stopped_publisher_refuses_on_entry() {
        let publisher = publisher();
        publisher.shutdown();

        let result = publisher.publish(b"{}", &MessageHeaders::new()).await;
        assert!(matches!(result, Err(QueueError::Stopped)));

        let result = publisher
            .publish_to_retry(b"{}", &MessageHeaders::new(), "retry.10s")
            .await;
        assert!(matches!(result, Err(QueueError::Stopped)));
    }

    #[tokio::test]
    async fn test_publish_without_broker_is_an_error() {
        let publisher = publisher();
        let result = publisher.publish(b"{}", &MessageHeaders::new()).await;
        assert!(matches!(result, Err(QueueError::Config(_))));
    }

    #[test]
    fn test_confirm_timeout_is_distinguishable() {
        let timeout = QueueError::ConfirmTimeout(Duration::from_secs(5));
        let nacked = QueueError::Nacked {
            routing_key: "events".to_string(),
        };
        assert!(timeout.is_unconfirmed());
        assert!(!nacked.is_unconfirmed());
    }
}
