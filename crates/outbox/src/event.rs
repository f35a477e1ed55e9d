use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an outbox event.
///
/// Doubles as the idempotency key consumers dedupe on, so it must be
/// assigned once at enqueue time and never regenerated on redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EventId> for Uuid {
    fn from(id: EventId) -> Self {
        id.0
    }
}

/// Delivery status of an outbox row.
///
/// `Failed` is an alerting flag, not a terminal state: the relay keeps
/// retrying failed rows on every cycle. Rows leave the undelivered set
/// only through `Sent` or manual deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OutboxStatus {
    /// Awaiting publication.
    #[default]
    Pending,

    /// Publish confirmed by the bus.
    Sent,

    /// Publish attempts exceeded the alert threshold; still retried.
    Failed,
}

impl OutboxStatus {
    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Sent => "SENT",
            OutboxStatus::Failed => "FAILED",
        }
    }

    /// Returns true if the row still needs delivery.
    pub fn is_undelivered(&self) -> bool {
        matches!(self, OutboxStatus::Pending | OutboxStatus::Failed)
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OutboxStatus::Pending),
            "SENT" => Ok(OutboxStatus::Sent),
            "FAILED" => Ok(OutboxStatus::Failed),
            other => Err(format!("unknown outbox status: {other}")),
        }
    }
}

/// A domain event recorded for later publication.
///
/// The row must be inserted in the same local transaction as the business
/// mutation it describes: no business commit without an outbox row, and no
/// outbox row without a committed business change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Unique identifier and consumer-side idempotency key.
    pub event_id: EventId,
    /// The kind of entity the event concerns (e.g. "Genre", "Book").
    pub aggregate_type: String,
    /// The entity identifier within its aggregate type.
    pub aggregate_id: String,
    /// Event discriminator (e.g. "GenreCreated", "BookCreated").
    pub event_type: String,
    /// Serialized event body.
    pub payload: serde_json::Value,
    /// Delivery status; only the relay transitions this.
    pub status: OutboxStatus,
    /// Number of publish attempts, for operational visibility.
    pub attempts: u32,
    /// Message of the most recent publish failure, if any.
    pub last_error: Option<String>,
    /// Enqueue time; drives FIFO delivery order per aggregate.
    pub created_at: DateTime<Utc>,
    /// When the publish was confirmed.
    pub sent_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Creates a pending event ready to enqueue.
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            sent_at: None,
        }
    }

    /// Returns the stable wire envelope published to the bus.
    pub fn envelope(&self) -> EventEnvelope {
        EventEnvelope {
            event_id: self.event_id,
            aggregate_type: self.aggregate_type.clone(),
            aggregate_id: self.aggregate_id.clone(),
            event_type: self.event_type.clone(),
            payload: self.payload.clone(),
            created_at: self.created_at,
        }
    }
}

/// Wire format of a published event, stable across services.
///
/// Consumers dedupe on `event_id`. Delivery status, attempt counters and
/// other relay bookkeeping never leave the owning service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
