use thiserror::Error;

/// Error taxonomy for the delivery pipeline.
///
/// `MalformedJob` is deliberately separate from everything else: a
/// structurally invalid job can never succeed, so the worker loop logs it
/// and absorbs it instead of letting the queue redeliver it.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed job: {0}")]
    MalformedJob(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    /// True for errors that must never be redelivered.
    pub fn is_malformed(&self) -> bool {
        matches!(self, DeliveryError::MalformedJob(_))
    }
}
