use std::time::Duration;

use async_trait::async_trait;

use crate::event::{EventId, OutboxEvent};
use crate::Result;

/// How long a claimed row stays invisible to other relay instances before
/// the claim lapses and the row becomes deliverable again.
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(30);

/// Counters for operational visibility of one service's outbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct OutboxStats {
    pub pending: u64,
    pub sent: u64,
    pub failed: u64,
    /// Age in seconds of the oldest undelivered event, if any.
    pub oldest_pending_age_seconds: Option<i64>,
}

/// Core trait for outbox store implementations.
///
/// Each write-side service owns one store; the relay is the only caller of
/// the status-transition methods and never touches payloads. Claiming uses
/// lease semantics so concurrent relay replicas do not double-deliver —
/// and if a lapsed lease lets a duplicate through anyway, consumers absorb
/// it via their `event_id` dedupe.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Inserts a new event with status `Pending`.
    ///
    /// Callers with a real database must enqueue inside the same
    /// transaction as the business write (see
    /// [`PostgresOutboxStore::enqueue_in_tx`](crate::PostgresOutboxStore::enqueue_in_tx));
    /// this method exists for stores where the write and the enqueue share
    /// one synchronization scope.
    async fn enqueue(&self, event: OutboxEvent) -> Result<EventId>;

    /// Claims up to `limit` undelivered events, oldest first.
    ///
    /// Claimed events are leased: they are excluded from other claims until
    /// the lease expires or a status transition releases them.
    async fn claim_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>>;

    /// Marks an event delivered after a bus-confirmed publish.
    async fn mark_sent(&self, event_id: EventId) -> Result<()>;

    /// Records a failed publish attempt and releases the claim.
    ///
    /// The event stays deliverable; once `attempts` reaches
    /// `alert_threshold` the status flips to `Failed` for alerting, but the
    /// relay keeps retrying it.
    async fn mark_attempt_failed(
        &self,
        event_id: EventId,
        error: &str,
        alert_threshold: u32,
    ) -> Result<()>;

    /// Releases a claim without recording an attempt.
    ///
    /// Used for events held back within a cycle to preserve per-aggregate
    /// ordering.
    async fn release_claim(&self, event_id: EventId) -> Result<()>;

    /// Returns delivery counters for this outbox.
    async fn stats(&self) -> Result<OutboxStats>;
}
