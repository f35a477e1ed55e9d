//! Saga error types.

use common::SagaId;
use thiserror::Error;

use crate::state::SagaStatus;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Saga is in an invalid status for the requested operation.
    #[error("Invalid saga state: expected {expected}, actual {actual}")]
    InvalidState { expected: String, actual: SagaStatus },

    /// Saga not found in the state store.
    #[error("Saga not found: {0}")]
    NotFound(SagaId),

    /// A saga with this ID already exists.
    #[error("Saga already exists: {0}")]
    AlreadyExists(SagaId),

    /// Another writer updated the saga concurrently.
    #[error("Version conflict for saga {0}: concurrent update detected")]
    VersionConflict(SagaId),

    /// No definition is registered for the saga type.
    #[error("No saga definition registered for type '{0}'")]
    DefinitionNotFound(String),

    /// The step history references a step missing from the definition.
    #[error("Unknown step '{step}' in saga type '{saga_type}'")]
    UnknownStep { saga_type: String, step: String },

    /// The state store backend failed.
    #[error("State store error: {0}")]
    Store(#[from] redis::RedisError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
