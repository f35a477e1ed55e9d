use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::event::{EventId, OutboxEvent, OutboxStatus};
use crate::store::{DEFAULT_CLAIM_LEASE, OutboxStats, OutboxStore};
use crate::{OutboxError, Result};

#[derive(Debug, Default)]
struct InMemoryOutboxState {
    events: Vec<OutboxEvent>,
    leases: HashMap<EventId, Instant>,
}

/// In-memory outbox store for testing and the default wiring.
///
/// Mirrors the PostgreSQL implementation's claim semantics: claimed rows
/// carry an expiring lease so concurrent relays skip them. Enqueueing
/// while holding the owning service's state lock stands in for the
/// shared-transaction discipline of the durable store.
#[derive(Clone)]
pub struct InMemoryOutboxStore {
    state: Arc<RwLock<InMemoryOutboxState>>,
    lease: Duration,
}

impl Default for InMemoryOutboxStore {
    fn default() -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryOutboxState::default())),
            lease: DEFAULT_CLAIM_LEASE,
        }
    }
}

impl InMemoryOutboxStore {
    /// Creates a new empty store with the default claim lease.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the claim lease duration.
    pub fn with_lease(lease: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryOutboxState::default())),
            lease,
        }
    }

    /// Returns the total number of events in the store.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Returns a copy of the event with the given ID, if present.
    pub async fn get(&self, event_id: EventId) -> Option<OutboxEvent> {
        self.state
            .read()
            .await
            .events
            .iter()
            .find(|e| e.event_id == event_id)
            .cloned()
    }

    /// Returns copies of all events, in enqueue order.
    pub async fn all_events(&self) -> Vec<OutboxEvent> {
        self.state.read().await.events.clone()
    }

    /// Clears all events and leases.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.events.clear();
        state.leases.clear();
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn enqueue(&self, event: OutboxEvent) -> Result<EventId> {
        let event_id = event.event_id;
        self.state.write().await.events.push(event);
        Ok(event_id)
    }

    async fn claim_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let mut state = self.state.write().await;
        let now = Instant::now();
        state.leases.retain(|_, deadline| *deadline > now);

        let mut claimable: Vec<OutboxEvent> = state
            .events
            .iter()
            .filter(|e| e.status.is_undelivered() && !state.leases.contains_key(&e.event_id))
            .cloned()
            .collect();
        claimable.sort_by_key(|e| e.created_at);
        claimable.truncate(limit);

        for event in &claimable {
            state.leases.insert(event.event_id, now + self.lease);
        }

        Ok(claimable)
    }

    async fn mark_sent(&self, event_id: EventId) -> Result<()> {
        let mut state = self.state.write().await;
        state.leases.remove(&event_id);
        let event = state
            .events
            .iter_mut()
            .find(|e| e.event_id == event_id)
            .ok_or(OutboxError::EventNotFound(event_id))?;

        event.status = OutboxStatus::Sent;
        event.sent_at = Some(Utc::now());
        event.last_error = None;
        Ok(())
    }

    async fn mark_attempt_failed(
        &self,
        event_id: EventId,
        error: &str,
        alert_threshold: u32,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.leases.remove(&event_id);
        let event = state
            .events
            .iter_mut()
            .find(|e| e.event_id == event_id)
            .ok_or(OutboxError::EventNotFound(event_id))?;

        event.attempts += 1;
        event.last_error = Some(error.to_string());
        if event.attempts >= alert_threshold {
            event.status = OutboxStatus::Failed;
        }
        Ok(())
    }

    async fn release_claim(&self, event_id: EventId) -> Result<()> {
        self.state.write().await.leases.remove(&event_id);
        Ok(())
    }

    async fn stats(&self) -> Result<OutboxStats> {
        let state = self.state.read().await;
        let mut stats = OutboxStats::default();
        let mut oldest_undelivered = None;

        for event in &state.events {
            match event.status {
                OutboxStatus::Pending => stats.pending += 1,
                OutboxStatus::Sent => stats.sent += 1,
                OutboxStatus::Failed => stats.failed += 1,
            }
            if event.status.is_undelivered() {
                oldest_undelivered = match oldest_undelivered {
                    None => Some(event.created_at),
                    Some(current) if event.created_at < current => Some(event.created_at),
                    keep => keep,
                };
            }
        }

        stats.oldest_pending_age_seconds =
            oldest_undelivered.map(|t| (Utc::now() - t).num_seconds());
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_event(aggregate_id: &str, event_type: &str) -> OutboxEvent {
        OutboxEvent::new("Genre", aggregate_id, event_type, serde_json::json!({}))
    }

    #[tokio::test]
    async fn enqueue_and_claim_oldest_first() {
        let store = InMemoryOutboxStore::new();

        let mut first = make_event("1", "GenreCreated");
        first.created_at = Utc::now() - chrono::Duration::seconds(10);
        let first_id = store.enqueue(first).await.unwrap();
        let second_id = store.enqueue(make_event("2", "GenreCreated")).await.unwrap();

        let claimed = store.claim_pending(10).await.unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].event_id, first_id);
        assert_eq!(claimed[1].event_id, second_id);
    }

    #[tokio::test]
    async fn claimed_events_are_leased() {
        let store = InMemoryOutboxStore::new();
        store.enqueue(make_event("1", "GenreCreated")).await.unwrap();

        let first_claim = store.claim_pending(10).await.unwrap();
        assert_eq!(first_claim.len(), 1);

        // A second relay instance claims nothing while the lease holds.
        let second_claim = store.claim_pending(10).await.unwrap();
        assert!(second_claim.is_empty());
    }

    #[tokio::test]
    async fn expired_lease_makes_event_claimable_again() {
        let store = InMemoryOutboxStore::with_lease(Duration::from_millis(0));
        store.enqueue(make_event("1", "GenreCreated")).await.unwrap();

        assert_eq!(store.claim_pending(10).await.unwrap().len(), 1);
        assert_eq!(store.claim_pending(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_sent_removes_from_claimable_set() {
        let store = InMemoryOutboxStore::new();
        let id = store.enqueue(make_event("1", "GenreCreated")).await.unwrap();

        store.claim_pending(10).await.unwrap();
        store.mark_sent(id).await.unwrap();

        assert!(store.claim_pending(10).await.unwrap().is_empty());
        let event = store.get(id).await.unwrap();
        assert_eq!(event.status, OutboxStatus::Sent);
        assert!(event.sent_at.is_some());
    }

    #[tokio::test]
    async fn failed_attempt_keeps_event_deliverable() {
        let store = InMemoryOutboxStore::new();
        let id = store.enqueue(make_event("1", "GenreCreated")).await.unwrap();

        store.claim_pending(10).await.unwrap();
        store
            .mark_attempt_failed(id, "bus unreachable", 5)
            .await
            .unwrap();

        let event = store.get(id).await.unwrap();
        assert_eq!(event.status, OutboxStatus::Pending);
        assert_eq!(event.attempts, 1);
        assert_eq!(event.last_error.as_deref(), Some("bus unreachable"));

        // Claim released, so the next cycle retries immediately.
        assert_eq!(store.claim_pending(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn crossing_alert_threshold_flips_to_failed_but_stays_retryable() {
        let store = InMemoryOutboxStore::new();
        let id = store.enqueue(make_event("1", "GenreCreated")).await.unwrap();

        for _ in 0..3 {
            store.claim_pending(10).await.unwrap();
            store.mark_attempt_failed(id, "boom", 3).await.unwrap();
        }

        let event = store.get(id).await.unwrap();
        assert_eq!(event.status, OutboxStatus::Failed);
        assert_eq!(event.attempts, 3);

        // Failed rows are still claimed for retry.
        assert_eq!(store.claim_pending(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_sent_unknown_event_errors() {
        let store = InMemoryOutboxStore::new();
        let result = store.mark_sent(EventId::new()).await;
        assert!(matches!(result, Err(OutboxError::EventNotFound(_))));
    }

    #[tokio::test]
    async fn stats_count_by_status() {
        let store = InMemoryOutboxStore::new();
        let sent = store.enqueue(make_event("1", "GenreCreated")).await.unwrap();
        let failed = store.enqueue(make_event("2", "GenreCreated")).await.unwrap();
        store.enqueue(make_event("3", "GenreCreated")).await.unwrap();

        store.mark_sent(sent).await.unwrap();
        store.mark_attempt_failed(failed, "boom", 1).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 1);
        assert!(stats.oldest_pending_age_seconds.is_some());
    }
}
