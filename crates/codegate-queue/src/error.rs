use thiserror::Error;

/// Queue transport errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Ack, abandon, dead-letter or renew failed at the transport.
    #[error("Settle failed: {0}")]
    SettleFailed(String),

    /// The lock token is unknown or its lock has expired.
    #[error("Message lock lost: {0}")]
    LockLost(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl QueueError {
    /// Whether the message may already have been redelivered to another consumer.
    pub fn is_lock_lost(&self) -> bool {
        matches!(self, QueueError::LockLost(_))
    }
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;
