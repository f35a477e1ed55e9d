//! Transactional outbox pattern for the library services.
//!
//! Every write-side service records its domain events in an outbox store
//! inside the same transaction as the business mutation, and a periodic
//! relay drains undelivered events onto the event bus. Delivery is
//! at-least-once; consumers dedupe on the event ID.

pub mod bus;
pub mod consumer;
pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod relay;
pub mod store;

pub use bus::{EventBus, InMemoryEventBus, PublishError};
pub use consumer::{ConsumerError, DedupingConsumer, EventConsumer};
pub use error::{OutboxError, Result};
pub use event::{EventEnvelope, EventId, OutboxEvent, OutboxStatus};
pub use memory::InMemoryOutboxStore;
pub use postgres::PostgresOutboxStore;
pub use relay::{OutboxRelay, RelayConfig, RelayCycle};
pub use store::{OutboxStats, OutboxStore};
