//! Genre service client trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use outbox::{InMemoryOutboxStore, OutboxStore};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ServiceError;
use crate::events::CatalogEvent;

/// A genre as known by the genre service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreRecord {
    pub genre_id: u64,
    pub name: String,
}

/// Result of ensuring a genre exists.
#[derive(Debug, Clone)]
pub struct EnsureGenreResult {
    pub genre: GenreRecord,
    /// True when this call created the genre (and compensation should
    /// delete it).
    pub created: bool,
}

/// Trait for genre service operations used by sagas.
#[async_trait]
pub trait GenreService: Send + Sync {
    /// Creates the genre or returns the existing one with that name.
    ///
    /// Repeating the call with the same idempotency key returns the
    /// original result without a second side effect.
    async fn ensure_genre(
        &self,
        name: &str,
        idempotency_key: &str,
    ) -> Result<EnsureGenreResult, ServiceError>;

    /// Deletes a genre. Deleting an absent genre is a no-op.
    async fn delete_genre(&self, genre_id: u64) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryGenreState {
    genres: HashMap<u64, GenreRecord>,
    by_name: HashMap<String, u64>,
    idempotency: HashMap<String, (u64, bool)>,
    next_id: u64,
    unavailable: bool,
    reject: bool,
}

/// In-memory genre service for testing and the default wiring.
#[derive(Clone)]
pub struct InMemoryGenreService {
    state: Arc<RwLock<InMemoryGenreState>>,
    outbox: InMemoryOutboxStore,
}

impl InMemoryGenreService {
    /// Creates a service writing events into the given outbox store.
    pub fn new(outbox: InMemoryOutboxStore) -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryGenreState::default())),
            outbox,
        }
    }

    /// Simulates the service being unreachable (retryable failures).
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Simulates the service rejecting requests (permanent failures).
    pub async fn set_reject(&self, reject: bool) {
        self.state.write().await.reject = reject;
    }

    /// Returns the number of genres currently stored.
    pub async fn genre_count(&self) -> usize {
        self.state.read().await.genres.len()
    }

    /// Returns true if a genre with the given name exists.
    pub async fn has_genre(&self, name: &str) -> bool {
        self.state.read().await.by_name.contains_key(name)
    }

    /// The service's outbox store.
    pub fn outbox(&self) -> &InMemoryOutboxStore {
        &self.outbox
    }
}

#[async_trait]
impl GenreService for InMemoryGenreService {
    async fn ensure_genre(
        &self,
        name: &str,
        idempotency_key: &str,
    ) -> Result<EnsureGenreResult, ServiceError> {
        let mut state = self.state.write().await;

        if state.unavailable {
            return Err(ServiceError::unavailable("genre service unavailable"));
        }
        if state.reject {
            return Err(ServiceError::rejected("genre request rejected"));
        }

        if let Some(&(genre_id, created)) = state.idempotency.get(idempotency_key)
            && let Some(genre) = state.genres.get(&genre_id)
        {
            return Ok(EnsureGenreResult {
                genre: genre.clone(),
                created,
            });
        }

        if let Some(&genre_id) = state.by_name.get(name) {
            let genre = state.genres[&genre_id].clone();
            state
                .idempotency
                .insert(idempotency_key.to_string(), (genre_id, false));
            return Ok(EnsureGenreResult {
                genre,
                created: false,
            });
        }

        state.next_id += 1;
        let genre = GenreRecord {
            genre_id: state.next_id,
            name: name.to_string(),
        };
        state.genres.insert(genre.genre_id, genre.clone());
        state.by_name.insert(name.to_string(), genre.genre_id);
        state
            .idempotency
            .insert(idempotency_key.to_string(), (genre.genre_id, true));

        // Business write and event row share the state lock scope, the
        // in-memory stand-in for a shared transaction.
        let event = CatalogEvent::GenreCreated {
            genre_id: genre.genre_id,
            name: genre.name.clone(),
        };
        self.outbox
            .enqueue(event.to_outbox_event())
            .await
            .map_err(|e| ServiceError::unavailable(e.to_string()))?;

        Ok(EnsureGenreResult {
            genre,
            created: true,
        })
    }

    async fn delete_genre(&self, genre_id: u64) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;

        if state.unavailable {
            return Err(ServiceError::unavailable("genre service unavailable"));
        }

        if let Some(genre) = state.genres.remove(&genre_id) {
            state.by_name.remove(&genre.name);
            let event = CatalogEvent::GenreDeleted { genre_id };
            self.outbox
                .enqueue(event.to_outbox_event())
                .await
                .map_err(|e| ServiceError::unavailable(e.to_string()))?;
        }
        Ok(())
    }
}
