use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::event::{EventId, OutboxEvent, OutboxStatus};
use crate::store::{DEFAULT_CLAIM_LEASE, OutboxStats, OutboxStore};
use crate::{OutboxError, Result};

/// Row struct for outbox_events queries.
#[derive(FromRow, Debug, Clone)]
struct OutboxRow {
    id: Uuid,
    aggregate_type: String,
    aggregate_id: String,
    event_type: String,
    payload: sqlx::types::Json<serde_json::Value>,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
}

impl OutboxRow {
    fn into_event(self) -> OutboxEvent {
        OutboxEvent {
            event_id: EventId::from_uuid(self.id),
            aggregate_type: self.aggregate_type,
            aggregate_id: self.aggregate_id,
            event_type: self.event_type,
            payload: self.payload.0,
            status: self.status.parse().unwrap_or(OutboxStatus::Pending),
            attempts: self.attempts.max(0) as u32,
            last_error: self.last_error,
            created_at: self.created_at,
            sent_at: self.sent_at,
        }
    }
}

const SELECT_COLUMNS: &str = "id, aggregate_type, aggregate_id, event_type, payload, \
     status, attempts, last_error, created_at, sent_at";

/// PostgreSQL-backed outbox store.
///
/// Claiming uses `FOR UPDATE SKIP LOCKED` plus a `claimed_until` lease so
/// multiple relay replicas can poll the same table without double
/// delivery.
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    /// Creates a new PostgreSQL outbox store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the outbox_events table and its delivery index.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!(
            "../../../migrations/001_create_outbox_events.sql"
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts an event inside the caller's transaction.
    ///
    /// This is the entry point that upholds the outbox invariant: the
    /// business mutation and its event row commit or roll back together.
    pub async fn enqueue_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &OutboxEvent,
    ) -> Result<EventId> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events
            (id, aggregate_type, aggregate_id, event_type, payload, status, attempts, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.event_id.as_uuid())
        .bind(&event.aggregate_type)
        .bind(&event.aggregate_id)
        .bind(&event.event_type)
        .bind(sqlx::types::Json(&event.payload))
        .bind(event.status.as_str())
        .bind(event.attempts as i32)
        .bind(event.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(event.event_id)
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn enqueue(&self, event: OutboxEvent) -> Result<EventId> {
        let mut tx = self.pool.begin().await?;
        let event_id = self.enqueue_in_tx(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(event_id)
    }

    async fn claim_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
            r#"
            UPDATE outbox_events
            SET claimed_until = NOW() + make_interval(secs => $2)
            WHERE id IN (
                SELECT id FROM outbox_events
                WHERE status <> 'SENT'
                  AND (claimed_until IS NULL OR claimed_until < NOW())
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(limit as i64)
        .bind(DEFAULT_CLAIM_LEASE.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        // UPDATE ... RETURNING does not guarantee row order.
        let mut events: Vec<OutboxEvent> = rows.into_iter().map(OutboxRow::into_event).collect();
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }

    async fn mark_sent(&self, event_id: EventId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'SENT',
                sent_at = NOW(),
                claimed_until = NULL,
                last_error = NULL
            WHERE id = $1
            "#,
        )
        .bind(event_id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::EventNotFound(event_id));
        }
        Ok(())
    }

    async fn mark_attempt_failed(
        &self,
        event_id: EventId,
        error: &str,
        alert_threshold: u32,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET attempts = attempts + 1,
                last_error = $2,
                claimed_until = NULL,
                status = CASE WHEN attempts + 1 >= $3 THEN 'FAILED' ELSE status END
            WHERE id = $1
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(error)
        .bind(alert_threshold as i32)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::EventNotFound(event_id));
        }
        Ok(())
    }

    async fn release_claim(&self, event_id: EventId) -> Result<()> {
        sqlx::query("UPDATE outbox_events SET claimed_until = NULL WHERE id = $1")
            .bind(event_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<OutboxStats> {
        #[derive(FromRow)]
        struct StatsRow {
            pending: Option<i64>,
            sent: Option<i64>,
            failed: Option<i64>,
            oldest_pending_age_seconds: Option<i64>,
        }

        let row: StatsRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'PENDING') AS pending,
                COUNT(*) FILTER (WHERE status = 'SENT') AS sent,
                COUNT(*) FILTER (WHERE status = 'FAILED') AS failed,
                CAST(MIN(EXTRACT(EPOCH FROM (NOW() - created_at)))
                     FILTER (WHERE status <> 'SENT') AS BIGINT) AS oldest_pending_age_seconds
            FROM outbox_events
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(OutboxStats {
            pending: row.pending.unwrap_or(0) as u64,
            sent: row.sent.unwrap_or(0) as u64,
            failed: row.failed.unwrap_or(0) as u64,
            oldest_pending_age_seconds: row.oldest_pending_age_seconds,
        })
    }
}
