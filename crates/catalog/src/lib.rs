//! Library catalog binding for the saga core.
//!
//! Defines the `CreateBook` saga: the Genre/Author/Book service client
//! contracts, the step invoker that drives them, the catalog domain
//! events each service records in its outbox, and an idempotent
//! read-model view.

pub mod create_book;
pub mod error;
pub mod events;
pub mod requests;
pub mod services;
pub mod view;

pub use create_book::{CreateBookInvoker, CreateBookPayload};
pub use error::{ServiceError, ServiceErrorKind};
pub use events::CatalogEvent;
pub use requests::{AuthorData, BookData, CreateBookSagaRequest, GenreData};
pub use services::author::{AuthorRecord, AuthorService, InMemoryAuthorService};
pub use services::book::{BookRecord, BookService, InMemoryBookService, NewBook};
pub use services::genre::{EnsureGenreResult, GenreRecord, GenreService, InMemoryGenreService};
pub use view::BookCatalogView;
