//! Book service client trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use outbox::{InMemoryOutboxStore, OutboxStore};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ServiceError;
use crate::events::CatalogEvent;

/// A book as known by the book service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub isbn: String,
    pub title: String,
    pub description: Option<String>,
    pub genre_id: u64,
    pub author_numbers: Vec<u64>,
}

/// Fields for a book create call.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub description: Option<String>,
    pub photo_uri: Option<String>,
    pub genre_id: u64,
    pub author_numbers: Vec<u64>,
}

/// Trait for book service operations used by sagas.
#[async_trait]
pub trait BookService: Send + Sync {
    /// Creates a book record and assigns its ISBN.
    ///
    /// Repeating the call with the same idempotency key returns the
    /// original record without creating a duplicate.
    async fn create_book(
        &self,
        book: &NewBook,
        idempotency_key: &str,
    ) -> Result<BookRecord, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryBookState {
    books: HashMap<String, BookRecord>,
    idempotency: HashMap<String, String>,
    next_seq: u64,
    unavailable: bool,
    reject: bool,
}

/// In-memory book service for testing and the default wiring.
#[derive(Clone)]
pub struct InMemoryBookService {
    state: Arc<RwLock<InMemoryBookState>>,
    outbox: InMemoryOutboxStore,
}

impl InMemoryBookService {
    /// Creates a service writing events into the given outbox store.
    pub fn new(outbox: InMemoryOutboxStore) -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryBookState::default())),
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

    /// Returns the number of books currently stored.
    pub async fn book_count(&self) -> usize {
        self.state.read().await.books.len()
    }

    /// The service's outbox store.
    pub fn outbox(&self) -> &InMemoryOutboxStore {
        &self.outbox
    }
}

#[async_trait]
impl BookService for InMemoryBookService {
    async fn create_book(
        &self,
        book: &NewBook,
        idempotency_key: &str,
    ) -> Result<BookRecord, ServiceError> {
        let mut state = self.state.write().await;

        if state.unavailable {
            return Err(ServiceError::unavailable("book service unavailable"));
        }
        if state.reject {
            return Err(ServiceError::rejected("book request rejected"));
        }
        if book.author_numbers.is_empty() {
            return Err(ServiceError::rejected("a book needs at least one author"));
        }

        if let Some(record) = state
            .idempotency
            .get(idempotency_key)
            .and_then(|isbn| state.books.get(isbn))
        {
            return Ok(record.clone());
        }

        state.next_seq += 1;
        let record = BookRecord {
            isbn: format!("978-{:010}", state.next_seq),
            title: book.title.clone(),
            description: book.description.clone(),
            genre_id: book.genre_id,
            author_numbers: book.author_numbers.clone(),
        };
        state.books.insert(record.isbn.clone(), record.clone());
        state
            .idempotency
            .insert(idempotency_key.to_string(), record.isbn.clone());

        let event = CatalogEvent::BookCreated {
            isbn: record.isbn.clone(),
            title: record.title.clone(),
            genre_id: record.genre_id,
            author_numbers: record.author_numbers.clone(),
        };
        self.outbox
            .enqueue(event.to_outbox_event())
            .await
            .map_err(|e| ServiceError::unavailable(e.to_string()))?;

        Ok(record)
    }
}
