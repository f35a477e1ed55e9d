//! Catalog domain events.
//!
//! One tagged sum type keyed by `eventType` replaces a per-event class
//! hierarchy; the outbox envelope carries the serialized variant as its
//! payload.

use outbox::OutboxEvent;
use serde::{Deserialize, Serialize};

/// Events the catalog services record in their outboxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum CatalogEvent {
    GenreCreated {
        genre_id: u64,
        name: String,
    },
    GenreDeleted {
        genre_id: u64,
    },
    AuthorCreated {
        author_number: u64,
        name: String,
    },
    AuthorDeleted {
        author_number: u64,
    },
    BookCreated {
        isbn: String,
        title: String,
        genre_id: u64,
        author_numbers: Vec<u64>,
    },
}

impl CatalogEvent {
    /// Returns the event type discriminator.
    pub fn event_type(&self) -> &'static str {
        match self {
            CatalogEvent::GenreCreated { .. } => "GenreCreated",
            CatalogEvent::GenreDeleted { .. } => "GenreDeleted",
            CatalogEvent::AuthorCreated { .. } => "AuthorCreated",
            CatalogEvent::AuthorDeleted { .. } => "AuthorDeleted",
            CatalogEvent::BookCreated { .. } => "BookCreated",
        }
    }

    /// Returns the aggregate type the event concerns.
    pub fn aggregate_type(&self) -> &'static str {
        match self {
            CatalogEvent::GenreCreated { .. } | CatalogEvent::GenreDeleted { .. } => "Genre",
            CatalogEvent::AuthorCreated { .. } | CatalogEvent::AuthorDeleted { .. } => "Author",
            CatalogEvent::BookCreated { .. } => "Book",
        }
    }

    /// Returns the aggregate identifier within its type.
    pub fn aggregate_id(&self) -> String {
        match self {
            CatalogEvent::GenreCreated { genre_id, .. }
            | CatalogEvent::GenreDeleted { genre_id } => genre_id.to_string(),
            CatalogEvent::AuthorCreated { author_number, .. }
            | CatalogEvent::AuthorDeleted { author_number } => author_number.to_string(),
            CatalogEvent::BookCreated { isbn, .. } => isbn.clone(),
        }
    }

    /// Builds the pending outbox row for this event.
    ///
    /// # Panics
    ///
    /// Panics if serialization fails, which cannot happen for these
    /// variants.
    pub fn to_outbox_event(&self) -> OutboxEvent {
        let payload =
            serde_json::to_value(self).expect("catalog event serialization is infallible");
        OutboxEvent::new(
            self.aggregate_type(),
            self.aggregate_id(),
            self.event_type(),
            payload,
        )
    }
}
