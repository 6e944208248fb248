//! Supervises the queue consumer.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tl_queue::{DeliveryHandler, QueueConsumer};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(25);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs a consumer into a delivery handler until shutdown, restarting it
/// after a fixed delay whenever it fails or the broker drops the stream.
pub struct QueueWorker {
    consumer: Arc<dyn QueueConsumer>,
    handler: Arc<dyn DeliveryHandler>,
    restart_delay: Duration,
    drain_timeout: Duration,
}

impl QueueWorker {
    pub fn new(consumer: Arc<dyn QueueConsumer>, handler: Arc<dyn DeliveryHandler>) -> Self {
        Self {
            consumer,
            handler,
            restart_delay: DEFAULT_RESTART_DELAY,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// How long shutdown waits for in-flight deliveries before closing the consumer.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let queue = self.consumer.identifier().to_string();
        info!(queue = %queue, "Queue worker started");

        loop {
            let consumer_shutdown = match shutdown_pending(&mut shutdown) {
                Some(receiver) => receiver,
                None => break,
            };

            match self
                .consumer
                .start(self.handler.clone(), consumer_shutdown)
                .await
            {
                Ok(()) => break,
                Err(e) => {
                    error!(
                        queue = %queue,
                        error = %e,
                        retry_in_secs = self.restart_delay.as_secs_f64(),
                        "Consumer stopped unexpectedly, restarting"
                    );
                }
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.restart_delay) => {}
            }
        }

        self.drain(&queue).await;
        self.consumer.stop().await;
        info!(queue = %queue, "Queue worker stopped");
    }

    /// Wait for dispatched deliveries to settle while the channel is still open.
    async fn drain(&self, queue: &str) {
        let start = Instant::now();
        while self.consumer.in_flight() > 0 && start.elapsed() < self.drain_timeout {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        let remaining = self.consumer.in_flight();
        if remaining > 0 {
            warn!(
                queue = %queue,
                in_flight = remaining,
                "Drain timeout reached, closing consumer with deliveries in flight"
            );
        }
    }
}

/// A receiver for the next consumer run, or `None` once shutdown was signalled.
///
/// The new receiver is taken before the check, so a signal sent in between is
/// seen by one of the two.
fn shutdown_pending(shutdown: &mut broadcast::Receiver<()>) -> Option<broadcast::Receiver<()>> {
    let next = shutdown.resubscribe();
    match shutdown.try_recv() {
        Err(broadcast::error::TryRecvError::Empty) => Some(next),
        _ => None,
    }
}
