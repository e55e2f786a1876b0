use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::AppResult,
    services::{ImportOutcome, ImportStatus},
};

use super::AppState;

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub run_id: Uuid,
}

/// Starts an import over the CSV request body
pub async fn start(
    State(state): State<AppState>,
    body: String,
) -> AppResult<(StatusCode, Json<StartResponse>)> {
    let run_id = state.imports.start(&body).await?;
    Ok((StatusCode::ACCEPTED, Json(StartResponse { run_id })))
}

/// Starts an import over the bundled sample history
pub async fn start_sample(
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<StartResponse>)> {
    let run_id = state.imports.start_sample().await?;
    Ok((StatusCode::ACCEPTED, Json(StartResponse { run_id })))
}

pub async fn progress(State(state): State<AppState>) -> Json<ImportStatus> {
    Json(state.imports.status().await)
}

/// Statistics of the last completed import; 404 until one finishes
pub async fn stats(State(state): State<AppState>) -> AppResult<Json<ImportOutcome>> {
    let outcome = state.imports.outcome().await?;
    Ok(Json(outcome))
}

pub async fn reset(State(state): State<AppState>) -> StatusCode {
    state.imports.reset().await;
    StatusCode::NO_CONTENT
}
