//! The CreateBook saga: step list, payload shape and step invoker.

use async_trait::async_trait;
use saga::{SagaDefinition, StepCall, StepDefinition, StepInvoker, StepOutcome};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::requests::{AuthorData, BookData, GenreData};
use crate::services::author::AuthorService;
use crate::services::book::{BookService, NewBook};
use crate::services::genre::GenreService;

/// The saga type identifier for book creation.
pub const SAGA_TYPE: &str = "CreateBook";

/// Step name: create or verify the genre.
pub const STEP_ENSURE_GENRE: &str = "ensure_genre";

/// Step name: create new authors and verify existing ones.
pub const STEP_CREATE_AUTHORS: &str = "create_authors";

/// Step name: create the book record.
pub const STEP_CREATE_BOOK: &str = "create_book";

/// The ordered step list for the CreateBook saga.
pub fn definition() -> SagaDefinition {
    SagaDefinition::new(
        SAGA_TYPE,
        vec![
            StepDefinition::with_compensation(STEP_ENSURE_GENRE),
            StepDefinition::with_compensation(STEP_CREATE_AUTHORS),
            StepDefinition::new(STEP_CREATE_BOOK),
        ],
    )
}

/// Saga payload: the original request plus context accumulated by steps.
///
/// Step results are merged into the saga payload by the orchestrator, so
/// the accumulated fields are optional and default-empty when the saga
/// starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateBookPayload {
    pub book: BookData,
    pub genre: GenreData,
    pub new_authors: Vec<AuthorData>,
    pub existing_author_ids: Vec<u64>,

    // Accumulated by ensure_genre.
    pub genre_id: Option<u64>,
    pub genre_created: Option<bool>,

    // Accumulated by create_authors.
    pub created_author_numbers: Option<Vec<u64>>,
    pub author_numbers: Option<Vec<u64>>,

    // Accumulated by create_book.
    pub isbn: Option<String>,
}

/// Step invoker backing the CreateBook saga with catalog service clients.
pub struct CreateBookInvoker<G, A, B> {
    genres: G,
    authors: A,
    books: B,
}

impl<G, A, B> CreateBookInvoker<G, A, B>
where
    G: GenreService,
    A: AuthorService,
    B: BookService,
{
    pub fn new(genres: G, authors: A, books: B) -> Self {
        Self {
            genres,
            authors,
            books,
        }
    }

    async fn ensure_genre(
        &self,
        payload: &CreateBookPayload,
        call: &StepCall,
    ) -> Result<serde_json::Value, ServiceError> {
        let result = self
            .genres
            .ensure_genre(&payload.genre.name, &call.idempotency_key())
            .await?;
        Ok(serde_json::json!({
            "genreId": result.genre.genre_id,
            "genreCreated": result.created,
        }))
    }

    async fn create_authors(
        &self,
        payload: &CreateBookPayload,
        call: &StepCall,
    ) -> Result<serde_json::Value, ServiceError> {
        let mut created = Vec::with_capacity(payload.new_authors.len());
        for (index, author) in payload.new_authors.iter().enumerate() {
            // Per-author key: a crashed and re-driven step resumes without
            // duplicating authors already created.
            let key = format!("{}:{index}", call.idempotency_key());
            let record = self.authors.create_author(author, &key).await?;
            created.push(record.author_number);
        }

        let mut all = created.clone();
        for &author_number in &payload.existing_author_ids {
            match self.authors.get_author(author_number).await? {
                Some(_) => all.push(author_number),
                None => {
                    return Err(ServiceError::rejected(format!(
                        "author {author_number} not found"
                    )));
                }
            }
        }

        Ok(serde_json::json!({
            "createdAuthorNumbers": created,
            "authorNumbers": all,
        }))
    }

    async fn create_book(
        &self,
        payload: &CreateBookPayload,
        call: &StepCall,
    ) -> Result<serde_json::Value, ServiceError> {
        let genre_id = payload
            .genre_id
            .ok_or_else(|| ServiceError::rejected("payload is missing the genre id"))?;
        let author_numbers = payload
            .author_numbers
            .clone()
            .ok_or_else(|| ServiceError::rejected("payload is missing the author numbers"))?;

        let book = NewBook {
            title: payload.book.title.clone(),
            description: payload.book.description.clone(),
            photo_uri: payload.book.photo_uri.clone(),
            genre_id,
            author_numbers,
        };
        let record = self
            .books
            .create_book(&book, &call.idempotency_key())
            .await?;
        Ok(serde_json::json!({ "isbn": record.isbn }))
    }

    async fn undo_ensure_genre(
        &self,
        payload: &CreateBookPayload,
    ) -> Result<(), ServiceError> {
        // Only undo a genre this saga created; a verified pre-existing
        // genre stays.
        if payload.genre_created == Some(true)
            && let Some(genre_id) = payload.genre_id
        {
            self.genres.delete_genre(genre_id).await?;
        }
        Ok(())
    }

    async fn undo_create_authors(
        &self,
        payload: &CreateBookPayload,
    ) -> Result<(), ServiceError> {
        if let Some(created) = &payload.created_author_numbers {
            for &author_number in created.iter().rev() {
                self.authors.delete_author(author_number).await?;
            }
        }
        Ok(())
    }
}

fn failure(error: ServiceError) -> StepOutcome {
    if error.is_retryable() {
        StepOutcome::RetryableFailure(error.to_string())
    } else {
        StepOutcome::PermanentFailure(error.to_string())
    }
}

fn parse_payload(call: &StepCall) -> Result<CreateBookPayload, StepOutcome> {
    serde_json::from_value(call.payload.clone())
        .map_err(|e| StepOutcome::PermanentFailure(format!("malformed saga payload: {e}")))
}

#[async_trait]
impl<G, A, B> StepInvoker for CreateBookInvoker<G, A, B>
where
    G: GenreService,
    A: AuthorService,
    B: BookService,
{
    async fn invoke(&self, call: &StepCall) -> StepOutcome {
        let payload = match parse_payload(call) {
            Ok(payload) => payload,
            Err(outcome) => return outcome,
        };

        let result = match call.step_name.as_str() {
            STEP_ENSURE_GENRE => self.ensure_genre(&payload, call).await,
            STEP_CREATE_AUTHORS => self.create_authors(&payload, call).await,
            STEP_CREATE_BOOK => self.create_book(&payload, call).await,
            other => {
                return StepOutcome::PermanentFailure(format!("unknown step '{other}'"));
            }
        };

        match result {
            Ok(value) => StepOutcome::Success(value),
            Err(error) => failure(error),
        }
    }

    async fn compensate(&self, call: &StepCall) -> StepOutcome {
        let payload = match parse_payload(call) {
            Ok(payload) => payload,
            Err(outcome) => return outcome,
        };

        let result = match call.step_name.as_str() {
            STEP_ENSURE_GENRE => self.undo_ensure_genre(&payload).await,
            STEP_CREATE_AUTHORS => self.undo_create_authors(&payload).await,
            // create_book has no compensating action.
            STEP_CREATE_BOOK => Ok(()),
            other => {
                return StepOutcome::PermanentFailure(format!("unknown step '{other}'"));
            }
        };

        match result {
            Ok(()) => StepOutcome::Success(serde_json::json!({})),
            Err(error) => failure(error),
        }
    }
}
