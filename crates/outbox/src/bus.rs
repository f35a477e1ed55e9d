use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};

use crate::event::EventEnvelope;

/// Error returned when a publish to the bus fails.
///
/// Publish failures are transient from the relay's point of view: the
/// event stays in the outbox and the next cycle retries it.
#[derive(Debug, Clone, Error)]
#[error("Publish failed: {0}")]
pub struct PublishError(pub String);

/// Trait for the event bus the relay publishes to.
///
/// A successful return means the bus confirmed the publish; only then may
/// the relay mark the event sent.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, envelope: &EventEnvelope) -> std::result::Result<(), PublishError>;
}

#[derive(Debug, Default)]
struct InMemoryBusState {
    delivered: Vec<EventEnvelope>,
    fail_on_publish: bool,
}

/// In-memory event bus for testing and the default wiring.
///
/// Records every confirmed delivery and fans envelopes out to broadcast
/// subscribers.
#[derive(Clone)]
pub struct InMemoryEventBus {
    state: Arc<RwLock<InMemoryBusState>>,
    sender: broadcast::Sender<EventEnvelope>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            state: Arc::new(RwLock::new(InMemoryBusState::default())),
            sender,
        }
    }
}

impl InMemoryEventBus {
    /// Creates a new in-memory bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the bus to reject publishes.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().await.fail_on_publish = fail;
    }

    /// Returns all envelopes delivered so far, in delivery order.
    pub async fn delivered(&self) -> Vec<EventEnvelope> {
        self.state.read().await.delivered.clone()
    }

    /// Returns the number of confirmed deliveries.
    pub async fn delivered_count(&self) -> usize {
        self.state.read().await.delivered.len()
    }

    /// Subscribes to envelopes as they are published.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, envelope: &EventEnvelope) -> std::result::Result<(), PublishError> {
        let mut state = self.state.write().await;
        if state.fail_on_publish {
            return Err(PublishError("bus unavailable".to_string()));
        }
        state.delivered.push(envelope.clone());
        // No subscribers is fine; the delivery log is the source of truth.
        let _ = self.sender.send(envelope.clone());
        Ok(())
    }
}
