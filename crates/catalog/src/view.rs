//! Book catalog read model fed from the event bus.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use outbox::{ConsumerError, EventConsumer, EventEnvelope};
use serde::Deserialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub struct BookSummary {
    pub isbn: String,
    pub title: String,
    pub genre_id: u64,
    pub author_numbers: Vec<u64>,
}

#[derive(Debug, Default)]
struct ViewState {
    books: HashMap<String, BookSummary>,
    genres: HashMap<u64, String>,
    authors: HashSet<u64>,
}

/// Read-model projection of catalog events.
///
/// Keyed on natural identifiers, so replaying an event is harmless; wrap
/// in [`DedupingConsumer`](outbox::DedupingConsumer) to also skip the
/// duplicate handling entirely.
#[derive(Clone, Default)]
pub struct BookCatalogView {
    state: Arc<RwLock<ViewState>>,
}

#[derive(Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
enum ViewEvent {
    GenreCreated { genre_id: u64, name: String },
    GenreDeleted { genre_id: u64 },
    AuthorCreated { author_number: u64 },
    AuthorDeleted { author_number: u64 },
    BookCreated {
        isbn: String,
        title: String,
        genre_id: u64,
        author_numbers: Vec<u64>,
    },
}

impl BookCatalogView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn book_count(&self) -> usize {
        self.state.read().await.books.len()
    }

    pub async fn get_book(&self, isbn: &str) -> Option<BookSummary> {
        self.state.read().await.books.get(isbn).cloned()
    }

    pub async fn genre_count(&self) -> usize {
        self.state.read().await.genres.len()
    }

    pub async fn author_count(&self) -> usize {
        self.state.read().await.authors.len()
    }
}

#[async_trait]
impl EventConsumer for BookCatalogView {
    fn name(&self) -> &'static str {
        "book-catalog-view"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ConsumerError> {
        let event: ViewEvent = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| ConsumerError(format!("malformed catalog event: {e}")))?;

        let mut state = self.state.write().await;
        match event {
            ViewEvent::GenreCreated { genre_id, name } => {
                state.genres.insert(genre_id, name);
            }
            ViewEvent::GenreDeleted { genre_id } => {
                state.genres.remove(&genre_id);
            }
            ViewEvent::AuthorCreated { author_number } => {
                state.authors.insert(author_number);
            }
            ViewEvent::AuthorDeleted { author_number } => {
                state.authors.remove(&author_number);
            }
            ViewEvent::BookCreated {
                isbn,
                title,
                genre_id,
                author_numbers,
            } => {
                state.books.insert(
                    isbn.clone(),
                    BookSummary {
                        isbn,
                        title,
                        genre_id,
                        author_numbers,
                    },
                );
            }
        }
        Ok(())
    }
}
