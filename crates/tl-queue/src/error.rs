use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Publish was not confirmed within {0:?}")]
    ConfirmTimeout(std::time::Duration),

    #[error("Broker rejected the message (routing key {routing_key})")]
    Nacked { routing_key: String },

    #[error("Delivery already settled")]
    AlreadySettled,

    #[error("Consumer stream ended")]
    StreamEnded,

    #[error("Queue is stopped")]
    Stopped,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// True for failures where the broker never confirmed the message either way.
    pub fn is_unconfirmed(&self) -> bool {
        matches!(self, QueueError::ConfirmTimeout(_))
    }
}
