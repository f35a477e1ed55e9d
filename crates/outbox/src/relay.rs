use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::Result;
use crate::bus::EventBus;
use crate::store::OutboxStore;

/// Tuning knobs for a relay instance.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// How often the relay polls for undelivered events.
    pub poll_interval: Duration,
    /// Maximum events claimed per cycle.
    pub batch_size: usize,
    /// Attempt count at which an event is flagged `Failed` for alerting.
    pub alert_threshold: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            alert_threshold: 5,
        }
    }
}

/// Outcome of a single relay cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayCycle {
    /// Events published and marked sent.
    pub published: usize,
    /// Events whose publish failed this cycle.
    pub failed: usize,
    /// Events skipped because an earlier event of the same aggregate
    /// failed this cycle.
    pub held_back: usize,
}

/// Periodic process that drains one service's outbox onto the event bus.
///
/// Guarantees at-least-once delivery: a crash between a confirmed publish
/// and the status update redelivers on the next run. Ordering is preserved
/// per aggregate id only — when an event fails, later events of the same
/// aggregate are held back until it goes through.
pub struct OutboxRelay<S, B> {
    service: String,
    store: S,
    bus: B,
    config: RelayConfig,
}

impl<S, B> OutboxRelay<S, B>
where
    S: OutboxStore,
    B: EventBus,
{
    /// Creates a relay with the default configuration.
    ///
    /// `service` names the owning service in logs and metrics.
    pub fn new(service: impl Into<String>, store: S, bus: B) -> Self {
        Self {
            service: service.into(),
            store,
            bus,
            config: RelayConfig::default(),
        }
    }

    /// Overrides the relay configuration.
    pub fn with_config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs the relay until the shutdown signal flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(service = %self.service, "outbox relay started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.drain_once().await {
                        tracing::error!(service = %self.service, error = %e, "outbox relay cycle failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(service = %self.service, "outbox relay stopped");
    }

    /// Performs one poll-and-publish cycle.
    #[tracing::instrument(skip(self), fields(service = %self.service))]
    pub async fn drain_once(&self) -> Result<RelayCycle> {
        let batch = self.store.claim_pending(self.config.batch_size).await?;
        if batch.is_empty() {
            return Ok(RelayCycle::default());
        }

        tracing::debug!(count = batch.len(), "publishing pending outbox events");

        let mut cycle = RelayCycle::default();
        let mut blocked: HashSet<(String, String)> = HashSet::new();

        for event in batch {
            let aggregate = (event.aggregate_type.clone(), event.aggregate_id.clone());
            if blocked.contains(&aggregate) {
                self.store.release_claim(event.event_id).await?;
                cycle.held_back += 1;
                continue;
            }

            match self.bus.publish(&event.envelope()).await {
                Ok(()) => {
                    self.store.mark_sent(event.event_id).await?;
                    metrics::counter!("outbox_published_total").increment(1);
                    cycle.published += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        event_id = %event.event_id,
                        event_type = %event.event_type,
                        attempts = event.attempts + 1,
                        error = %e,
                        "outbox publish failed; will retry next cycle"
                    );
                    self.store
                        .mark_attempt_failed(
                            event.event_id,
                            &e.to_string(),
                            self.config.alert_threshold,
                        )
                        .await?;
                    metrics::counter!("outbox_publish_failures_total").increment(1);
                    cycle.failed += 1;
                    blocked.insert(aggregate);
                }
            }
        }

        Ok(cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryEventBus;
    use crate::event::{OutboxEvent, OutboxStatus};
    use crate::memory::InMemoryOutboxStore;
    use chrono::Utc;

    fn relay(
        store: InMemoryOutboxStore,
        bus: InMemoryEventBus,
    ) -> OutboxRelay<InMemoryOutboxStore, InMemoryEventBus> {
        OutboxRelay::new("genre-service", store, bus)
    }

    fn make_event(aggregate_id: &str, event_type: &str, age_secs: i64) -> OutboxEvent {
        let mut event = OutboxEvent::new("Genre", aggregate_id, event_type, serde_json::json!({}));
        event.created_at = Utc::now() - chrono::Duration::seconds(age_secs);
        event
    }

    #[tokio::test]
    async fn drain_publishes_pending_and_marks_sent() {
        let store = InMemoryOutboxStore::new();
        let bus = InMemoryEventBus::new();
        let id = store
            .enqueue(make_event("1", "GenreCreated", 2))
            .await
            .unwrap();
        store
            .enqueue(make_event("2", "GenreCreated", 1))
            .await
            .unwrap();

        let cycle = relay(store.clone(), bus.clone()).drain_once().await.unwrap();

        assert_eq!(cycle.published, 2);
        assert_eq!(cycle.failed, 0);
        assert_eq!(bus.delivered_count().await, 2);
        assert_eq!(store.get(id).await.unwrap().status, OutboxStatus::Sent);
    }

    #[tokio::test]
    async fn drain_preserves_created_at_order() {
        let store = InMemoryOutboxStore::new();
        let bus = InMemoryEventBus::new();
        store
            .enqueue(make_event("1", "GenreUpdated", 5))
            .await
            .unwrap();
        store
            .enqueue(make_event("1", "GenreDeleted", 1))
            .await
            .unwrap();
        store
            .enqueue(make_event("1", "GenreCreated", 10))
            .await
            .unwrap();

        relay(store, bus.clone()).drain_once().await.unwrap();

        let delivered = bus.delivered().await;
        let types: Vec<&str> = delivered.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, ["GenreCreated", "GenreUpdated", "GenreDeleted"]);
    }

    #[tokio::test]
    async fn publish_failure_leaves_event_for_next_cycle() {
        let store = InMemoryOutboxStore::new();
        let bus = InMemoryEventBus::new();
        let id = store
            .enqueue(make_event("1", "GenreCreated", 1))
            .await
            .unwrap();

        bus.set_fail_on_publish(true).await;
        let relay = relay(store.clone(), bus.clone());
        let cycle = relay.drain_once().await.unwrap();
        assert_eq!(cycle.published, 0);
        assert_eq!(cycle.failed, 1);
        assert_eq!(store.get(id).await.unwrap().attempts, 1);

        // Bus recovers; next cycle delivers.
        bus.set_fail_on_publish(false).await;
        let cycle = relay.drain_once().await.unwrap();
        assert_eq!(cycle.published, 1);
        assert_eq!(store.get(id).await.unwrap().status, OutboxStatus::Sent);
    }

    #[tokio::test]
    async fn failure_holds_back_same_aggregate_only() {
        let store = InMemoryOutboxStore::new();
        let bus = InMemoryEventBus::new();
        store
            .enqueue(make_event("genre-1", "GenreCreated", 3))
            .await
            .unwrap();
        store
            .enqueue(make_event("genre-1", "GenreUpdated", 2))
            .await
            .unwrap();
        let other = store
            .enqueue(make_event("genre-2", "GenreCreated", 1))
            .await
            .unwrap();

        // Fail the first publish, then recover mid-cycle is not possible with
        // the fail switch, so fail everything and inspect hold-back counts.
        bus.set_fail_on_publish(true).await;
        let cycle = relay(store.clone(), bus.clone()).drain_once().await.unwrap();

        // First genre-1 event fails; the second is held back without an
        // attempt. genre-2 fails independently.
        assert_eq!(cycle.failed, 2);
        assert_eq!(cycle.held_back, 1);
        assert_eq!(store.get(other).await.unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn empty_outbox_is_a_quiet_cycle() {
        let store = InMemoryOutboxStore::new();
        let bus = InMemoryEventBus::new();
        let cycle = relay(store, bus).drain_once().await.unwrap();
        assert_eq!(cycle, RelayCycle::default());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let store = InMemoryOutboxStore::new();
        let bus = InMemoryEventBus::new();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(relay(store, bus).run(rx));
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("relay did not stop")
            .unwrap();
    }
}
