//! Author service client trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use outbox::{InMemoryOutboxStore, OutboxStore};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ServiceError;
use crate::events::CatalogEvent;
use crate::requests::AuthorData;

/// An author as known by the author service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub author_number: u64,
    pub name: String,
    pub bio: Option<String>,
    pub photo_uri: Option<String>,
}

/// Trait for author service operations used by sagas.
#[async_trait]
pub trait AuthorService: Send + Sync {
    /// Creates an author.
    ///
    /// Repeating the call with the same idempotency key returns the
    /// original record without creating a duplicate.
    async fn create_author(
        &self,
        author: &AuthorData,
        idempotency_key: &str,
    ) -> Result<AuthorRecord, ServiceError>;

    /// Looks an author up by number.
    async fn get_author(&self, author_number: u64) -> Result<Option<AuthorRecord>, ServiceError>;

    /// Deletes an author. Deleting an absent author is a no-op.
    async fn delete_author(&self, author_number: u64) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryAuthorState {
    authors: HashMap<u64, AuthorRecord>,
    idempotency: HashMap<String, u64>,
    next_number: u64,
    unavailable: bool,
    reject: bool,
}

/// In-memory author service for testing and the default wiring.
#[derive(Clone)]
pub struct InMemoryAuthorService {
    state: Arc<RwLock<InMemoryAuthorState>>,
    outbox: InMemoryOutboxStore,
}

impl InMemoryAuthorService {
    /// Creates a service writing events into the given outbox store.
    pub fn new(outbox: InMemoryOutboxStore) -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryAuthorState::default())),
            outbox,
        }
    }

    /// Simulates the service being unreachable (retryable failures).
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Simulates the service rejecting creates (permanent failures).
    pub async fn set_reject(&self, reject: bool) {
        self.state.write().await.reject = reject;
    }

    /// Returns the number of authors currently stored.
    pub async fn author_count(&self) -> usize {
        self.state.read().await.authors.len()
    }

    /// Seeds an existing author, as if created outside any saga.
    pub async fn seed_author(&self, name: &str) -> u64 {
        let mut state = self.state.write().await;
        state.next_number += 1;
        let number = state.next_number;
        state.authors.insert(
            number,
            AuthorRecord {
                author_number: number,
                name: name.to_string(),
                bio: None,
                photo_uri: None,
            },
        );
        number
    }

    /// The service's outbox store.
    pub fn outbox(&self) -> &InMemoryOutboxStore {
        &self.outbox
    }
}

#[async_trait]
impl AuthorService for InMemoryAuthorService {
    async fn create_author(
        &self,
        author: &AuthorData,
        idempotency_key: &str,
    ) -> Result<AuthorRecord, ServiceError> {
        let mut state = self.state.write().await;

        if state.unavailable {
            return Err(ServiceError::unavailable("author service unavailable"));
        }
        if state.reject {
            return Err(ServiceError::rejected("author request rejected"));
        }

        if let Some(&number) = state.idempotency.get(idempotency_key)
            && let Some(record) = state.authors.get(&number)
        {
            return Ok(record.clone());
        }

        state.next_number += 1;
        let record = AuthorRecord {
            author_number: state.next_number,
            name: author.name.clone(),
            bio: author.bio.clone(),
            photo_uri: author.photo_uri.clone(),
        };
        state.authors.insert(record.author_number, record.clone());
        state
            .idempotency
            .insert(idempotency_key.to_string(), record.author_number);

        let event = CatalogEvent::AuthorCreated {
            author_number: record.author_number,
            name: record.name.clone(),
        };
        self.outbox
            .enqueue(event.to_outbox_event())
            .await
            .map_err(|e| ServiceError::unavailable(e.to_string()))?;

        Ok(record)
    }

    async fn get_author(&self, author_number: u64) -> Result<Option<AuthorRecord>, ServiceError> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(ServiceError::unavailable("author service unavailable"));
        }
        Ok(state.authors.get(&author_number).cloned())
    }

    async fn delete_author(&self, author_number: u64) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;

        if state.unavailable {
            return Err(ServiceError::unavailable("author service unavailable"));
        }

        if state.authors.remove(&author_number).is_some() {
            let event = CatalogEvent::AuthorDeleted { author_number };
            self.outbox
                .enqueue(event.to_outbox_event())
                .await
                .map_err(|e| ServiceError::unavailable(e.to_string()))?;
        }
        Ok(())
    }
}
