//! Request payloads for catalog sagas.

use serde::{Deserialize, Serialize};

/// Request to create a book, its genre, and any new authors in one saga.
///
/// Authors can be brand new (created by the saga), existing (verified by
/// number), or a mix; at least one of the two lists must be non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateBookSagaRequest {
    pub book: BookData,
    pub genre: GenreData,
    pub new_authors: Vec<AuthorData>,
    pub existing_author_ids: Vec<u64>,
}

impl CreateBookSagaRequest {
    /// Checks the request names at least one author.
    pub fn validate(&self) -> Result<(), String> {
        if self.new_authors.is_empty() && self.existing_author_ids.is_empty() {
            return Err(
                "must provide either newAuthors or existingAuthorIds (or both)".to_string(),
            );
        }
        if self.book.title.trim().is_empty() {
            return Err("book title must not be empty".to_string());
        }
        if self.genre.name.trim().is_empty() {
            return Err("genre name must not be empty".to_string());
        }
        Ok(())
    }
}

/// Book fields carried through the saga.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookData {
    pub title: String,
    pub description: Option<String>,
    pub photo_uri: Option<String>,
}

/// Genre to create or verify.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenreData {
    pub name: String,
}

/// A new author to create as part of the saga.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthorData {
    pub name: String,
    pub bio: Option<String>,
    pub photo_uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CreateBookSagaRequest {
        CreateBookSagaRequest {
            book: BookData {
                title: "Dune".to_string(),
                description: Some("Desert planet".to_string()),
                photo_uri: None,
            },
            genre: GenreData {
                name: "Science Fiction".to_string(),
            },
            new_authors: vec![AuthorData {
                name: "Frank Herbert".to_string(),
                bio: None,
                photo_uri: None,
            }],
            existing_author_ids: vec![],
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn test_request_without_authors_is_rejected() {
        let mut request = valid_request();
        request.new_authors.clear();
        assert!(request.validate().is_err());

        request.existing_author_ids = vec![42];
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_empty_title_or_genre_is_rejected() {
        let mut request = valid_request();
        request.book.title = "  ".to_string();
        assert!(request.validate().is_err());

        let mut request = valid_request();
        request.genre.name = String::new();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_deserializes_camel_case() {
        let json = serde_json::json!({
            "book": {"title": "Dune", "photoUri": "http://covers/dune.jpg"},
            "genre": {"name": "Science Fiction"},
            "newAuthors": [{"name": "Frank Herbert"}],
            "existingAuthorIds": [7]
        });

        let request: CreateBookSagaRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.book.title, "Dune");
        assert_eq!(request.book.photo_uri.as_deref(), Some("http://covers/dune.jpg"));
        assert_eq!(request.new_authors.len(), 1);
        assert_eq!(request.existing_author_ids, [7]);
    }
}
