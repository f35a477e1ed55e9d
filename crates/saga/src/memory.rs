use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::SagaId;
use tokio::sync::RwLock;

use crate::instance::SagaInstance;
use crate::store::SagaStore;
use crate::{Result, SagaError};

/// In-memory saga state store for testing and the default wiring.
///
/// Provides the same compare-and-swap semantics as the Redis
/// implementation.
#[derive(Clone, Default)]
pub struct InMemorySagaStore {
    sagas: Arc<RwLock<HashMap<SagaId, SagaInstance>>>,
}

impl InMemorySagaStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sagas.
    pub async fn saga_count(&self) -> usize {
        self.sagas.read().await.len()
    }

    /// Clears all sagas.
    pub async fn clear(&self) {
        self.sagas.write().await.clear();
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn insert(&self, instance: &SagaInstance) -> Result<()> {
        let mut sagas = self.sagas.write().await;
        if sagas.contains_key(&instance.saga_id()) {
            return Err(SagaError::AlreadyExists(instance.saga_id()));
        }
        sagas.insert(instance.saga_id(), instance.clone());
        Ok(())
    }

    async fn update(&self, instance: &mut SagaInstance) -> Result<()> {
        let mut sagas = self.sagas.write().await;
        let stored = sagas
            .get_mut(&instance.saga_id())
            .ok_or(SagaError::NotFound(instance.saga_id()))?;

        if stored.version != instance.version {
            return Err(SagaError::VersionConflict(instance.saga_id()));
        }

        instance.version += 1;
        *stored = instance.clone();
        Ok(())
    }

    async fn get(&self, saga_id: SagaId) -> Result<Option<SagaInstance>> {
        Ok(self.sagas.read().await.get(&saga_id).cloned())
    }

    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<SagaInstance>> {
        let sagas = self.sagas.read().await;
        let mut stale: Vec<SagaInstance> = sagas
            .values()
            .filter(|s| !s.status().is_terminal() && s.updated_at() < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|s| s.updated_at());
        Ok(stale)
    }
}
