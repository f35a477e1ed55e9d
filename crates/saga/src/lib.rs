//! Saga orchestration for distributed library transactions.
//!
//! A saga is an ordered list of remote steps with compensating actions.
//! The orchestrator drives each instance through its steps, persisting
//! progress to the saga state store before and after every remote call so
//! a crashed process can resume from the last known safe point. Step
//! failures are classified: retryable failures back off and retry up to a
//! ceiling, permanent failures unwind completed steps in reverse order
//! through the compensation executor.

pub mod compensation;
pub mod definition;
pub mod error;
pub mod instance;
pub mod invoker;
pub mod memory;
pub mod orchestrator;
pub mod redis_store;
pub mod retry;
pub mod state;
pub mod store;
pub mod sweeper;

pub use compensation::CompensationExecutor;
pub use definition::{SagaDefinition, StepDefinition};
pub use error::{Result, SagaError};
pub use instance::{SagaInstance, StepOutcomeKind, StepRecord};
pub use invoker::{StepCall, StepInvoker, StepOutcome};
pub use memory::InMemorySagaStore;
pub use orchestrator::SagaOrchestrator;
pub use redis_store::RedisSagaStore;
pub use retry::RetryPolicy;
pub use state::SagaStatus;
pub use store::SagaStore;
pub use sweeper::StalenessSweeper;

pub use common::SagaId;
