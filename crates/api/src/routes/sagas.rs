//! Saga trigger and query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use catalog::{CreateBookSagaRequest, create_book};
use common::SagaId;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaAcceptedResponse {
    pub saga_id: String,
    pub status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaStatusResponse {
    pub saga_id: String,
    pub saga_type: String,
    pub status: String,
    pub current_step: usize,
    pub steps: Vec<StepResponse>,
    pub failure_reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResponse {
    pub name: String,
    pub outcome: String,
    pub at: String,
}

/// POST /sagas/create-book — start a CreateBook saga.
///
/// Returns 202 with the saga ID immediately; the saga is driven in a
/// background task and observed via `GET /sagas/{id}`.
#[tracing::instrument(skip(state, request))]
pub async fn create_book(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateBookSagaRequest>,
) -> Result<(StatusCode, Json<SagaAcceptedResponse>), ApiError> {
    request.validate().map_err(ApiError::BadRequest)?;

    let payload = serde_json::to_value(&request)
        .map_err(|e| ApiError::Internal(format!("failed to serialize request: {e}")))?;
    let saga_id = state
        .orchestrator
        .begin_saga(create_book::SAGA_TYPE, payload)
        .await?;

    let driver = state.clone();
    tokio::spawn(async move {
        if let Err(e) = driver.orchestrator.run_saga(saga_id).await {
            tracing::error!(%saga_id, error = %e, "saga drive failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(SagaAcceptedResponse {
            saga_id: saga_id.to_string(),
            status: "STARTED".to_string(),
        }),
    ))
}

/// GET /sagas/:id — current status and step history of a saga.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SagaStatusResponse>, ApiError> {
    let saga_id = parse_saga_id(&id)?;

    let saga = state
        .orchestrator
        .get_saga(saga_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Saga {id} not found")))?;

    let steps = saga
        .step_history()
        .iter()
        .map(|record| StepResponse {
            name: record.step_name.clone(),
            outcome: format!("{:?}", record.outcome),
            at: record.at.to_rfc3339(),
        })
        .collect();

    Ok(Json(SagaStatusResponse {
        saga_id: saga.saga_id().to_string(),
        saga_type: saga.saga_type().to_string(),
        status: saga.status().to_string(),
        current_step: saga.current_step(),
        steps,
        failure_reason: saga.failure_reason().map(String::from),
    }))
}

fn parse_saga_id(id: &str) -> Result<SagaId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid saga ID format: {e}")))?;
    Ok(SagaId::from(uuid))
}
