//! Outbox delivery counters, per service.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use outbox::{OutboxStats, OutboxStore};

use crate::AppState;
use crate::error::ApiError;

/// GET /outbox/stats — delivery counters for every service outbox.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<&'static str, OutboxStats>>, ApiError> {
    let mut stats = BTreeMap::new();
    for (service, store) in [
        ("genre-service", state.genres.outbox()),
        ("author-service", state.authors.outbox()),
        ("book-service", state.books.outbox()),
    ] {
        let service_stats = store
            .stats()
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        stats.insert(service, service_stats);
    }
    Ok(Json(stats))
}
