//! HTTP route handlers for the sorter API.

use std::sync::Arc;

use anyhow::anyhow;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sorter::coordinator::{Coordinator, CoordinatorError};
use sorter::core::outcome::{BestEffort, Degradation};
use sorter::core::types::{Batch, BatchCounts, Command, RunState};
use tracing::error;

use crate::notifications::Notification;
use crate::state::{AppState, ChangeEvent};

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/system_status", get(get_status))
        .route("/batches", get(list_batches).post(create_batch))
        .route("/batch", post(create_batch))
        .route("/batches/{id}", get(get_batch).put(update_batch))
        .route("/control", post(control))
        .route("/notifications", get(list_notifications))
}

/// JSON error body: `{"success": false, "error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %format!("{err:#}"), "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::UnknownCommand(_) => Self::bad_request(err.to_string()),
            CoordinatorError::Store(err) => err.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "success": false, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

/// Run a coordinator call on the blocking pool; store access is synchronous.
async fn run_blocking<T, E, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Coordinator) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let coordinator = Arc::clone(&state.coordinator);
    match tokio::task::spawn_blocking(move || f(&coordinator)).await {
        Ok(result) => result.map_err(Into::into),
        Err(err) => Err(anyhow!("coordinator task failed: {err}").into()),
    }
}

fn publish_degradations<T>(state: &AppState, result: &BestEffort<T>) {
    for degradation in &result.degradations {
        state.publish(ChangeEvent::Degraded {
            message: degradation.to_string(),
        });
    }
}

async fn health() -> &'static str {
    "ok"
}

/// GET /api/status - metrics, run state and active batch counts.
async fn get_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let status = run_blocking(&state, |c| c.status()).await?;
    let value = serde_json::to_value(status.report()).map_err(anyhow::Error::from)?;
    Ok(Json(value))
}

/// GET /api/batches - all batches, newest first.
async fn list_batches(State(state): State<AppState>) -> Result<Json<Vec<Batch>>, ApiError> {
    let batches = run_blocking(&state, |c| c.list_batches()).await?;
    Ok(Json(batches))
}

/// GET /api/batches/:id
async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Batch>, ApiError> {
    run_blocking(&state, move |c| c.get_batch(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("batch {id} not found")))
}

#[derive(Debug, Serialize)]
struct CreateBatchResponse {
    status: &'static str,
    id: i64,
    batch_number: i64,
    degraded: bool,
}

/// POST /api/batches - create a batch with monthly numbering.
///
/// All counts are optional; an empty body creates a zeroed batch.
async fn create_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CreateBatchResponse>, ApiError> {
    let counts = parse_counts(&body)?;
    let created = run_blocking(&state, move |c| c.create_batch(counts)).await?;
    publish_degradations(&state, &created);
    state.publish(ChangeEvent::BatchCreated {
        id: created.value.id,
        batch_number: created.value.batch_number,
    });
    Ok(Json(CreateBatchResponse {
        status: "success",
        id: created.value.id,
        batch_number: created.value.batch_number,
        degraded: created.is_degraded(),
    }))
}

/// PUT /api/batches/:id - overwrite a batch's counts.
async fn update_batch(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Batch>, ApiError> {
    let counts = parse_counts(&body)?;
    let updated = run_blocking(&state, move |c| c.record_counts(id, counts))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("batch {id} not found")))?;
    state.publish(ChangeEvent::BatchUpdated { id });
    Ok(Json(updated))
}

fn parse_counts(body: &[u8]) -> Result<BatchCounts, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(BatchCounts::default());
    }
    serde_json::from_slice::<Option<BatchCounts>>(body)
        .map(Option::unwrap_or_default)
        .map_err(|err| ApiError::bad_request(format!("invalid batch counts: {err}")))
}

#[derive(Debug, Deserialize)]
struct ControlRequest {
    command: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ControlResponse {
    success: bool,
    new_state: RunState,
    degraded: bool,
    degradations: Vec<Degradation>,
}

/// POST /api/control - apply TOGGLE, NEW_BATCH or CONTINUE.
async fn control(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ControlResponse>, ApiError> {
    let request: ControlRequest = serde_json::from_slice(&body)
        .map_err(|err| ApiError::bad_request(format!("invalid control request: {err}")))?;
    let command = Command::parse(&request.command);
    let known = !matches!(command, Command::Unknown(_));
    let applied = run_blocking(&state, {
        let command = command.clone();
        move |c| c.handle_command(&command)
    })
    .await?;

    publish_degradations(&state, &applied);
    if known {
        state.publish(ChangeEvent::RunStateChanged {
            command: command.to_string(),
            state: applied.value,
        });
    }

    Ok(Json(ControlResponse {
        success: true,
        new_state: applied.value,
        degraded: applied.is_degraded(),
        degradations: applied.degradations,
    }))
}

/// GET /api/notifications - recent events, newest first.
async fn list_notifications(State(state): State<AppState>) -> Json<Vec<Notification>> {
    Json(state.notifications.list())
}
