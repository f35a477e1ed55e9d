//! Saga state store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::SagaId;

use crate::Result;
use crate::instance::SagaInstance;

/// Durable, keyed store of saga instances.
///
/// The orchestrator is the only writer. Updates use compare-and-swap on
/// the instance's version counter so no two orchestrator tasks can mutate
/// the same saga concurrently — a conflict surfaces as
/// [`SagaError::VersionConflict`](crate::SagaError::VersionConflict)
/// instead of a lost write.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Persists a new instance; fails if the saga ID already exists.
    async fn insert(&self, instance: &SagaInstance) -> Result<()>;

    /// Persists an updated instance.
    ///
    /// Succeeds only when the stored version matches the instance's; on
    /// success the instance's version is bumped to the stored value.
    async fn update(&self, instance: &mut SagaInstance) -> Result<()>;

    /// Loads an instance by ID.
    async fn get(&self, saga_id: SagaId) -> Result<Option<SagaInstance>>;

    /// Returns non-terminal instances not updated since `cutoff`.
    ///
    /// Used by the staleness sweeper; implementations may scan.
    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<SagaInstance>>;
}
