use thiserror::Error;
use tl_queue::QueueError;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures the check-in state machine cannot route by itself.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Republish failed: {0}")]
    Republish(#[source] QueueError),

    #[error("Settling delivery failed: {0}")]
    Settle(#[source] QueueError),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}
