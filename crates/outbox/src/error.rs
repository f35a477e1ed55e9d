use thiserror::Error;

use crate::event::EventId;

/// Errors that can occur when interacting with the outbox store.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// The referenced event does not exist in the store.
    #[error("Outbox event not found: {0}")]
    EventNotFound(EventId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
