use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::event::{EventEnvelope, EventId};

/// Error returned by an event consumer.
#[derive(Debug, Error)]
#[error("Consumer error: {0}")]
pub struct ConsumerError(pub String);

/// Trait for downstream consumers of published envelopes.
///
/// Delivery is at-least-once, so handlers must tolerate duplicates; wrap a
/// consumer in [`DedupingConsumer`] to get that for free.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// Returns the consumer name for logging.
    fn name(&self) -> &'static str;

    /// Handles one envelope.
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ConsumerError>;
}

/// Wraps a consumer with event-id dedup so at-least-once delivery
/// collapses to exactly-once observable effects.
#[derive(Clone)]
pub struct DedupingConsumer<C> {
    inner: Arc<C>,
    seen: Arc<RwLock<HashSet<EventId>>>,
}

impl<C: EventConsumer> DedupingConsumer<C> {
    /// Wraps the given consumer.
    pub fn new(inner: C) -> Self {
        Self {
            inner: Arc::new(inner),
            seen: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Returns the wrapped consumer.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Returns how many distinct events have been handled.
    pub async fn seen_count(&self) -> usize {
        self.seen.read().await.len()
    }
}

#[async_trait]
impl<C: EventConsumer> EventConsumer for DedupingConsumer<C> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ConsumerError> {
        {
            let mut seen = self.seen.write().await;
            if !seen.insert(envelope.event_id) {
                tracing::debug!(
                    consumer = self.inner.name(),
                    event_id = %envelope.event_id,
                    "duplicate delivery ignored"
                );
                return Ok(());
            }
        }

        match self.inner.handle(envelope).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Un-mark so a redelivery can retry the handler.
                self.seen.write().await.remove(&envelope.event_id);
                Err(e)
            }
        }
    }
}
