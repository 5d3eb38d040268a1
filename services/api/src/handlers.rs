//! Axum Handlers for the REST API
//!
//! Read-only endpoints for the scenario catalog and backend status. Sessions
//! themselves live on the WebSocket. The handlers use `utoipa` doc comments
//! to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use sparc_core::scenario::ScenarioError;
use std::sync::Arc;
use tracing::warn;

use crate::{
    config::ResponseMode,
    models::{ErrorResponse, ScenarioInfo, StatusReport},
    state::AppState,
};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => {
                warn!(%message, "Resource not found");
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}

impl From<ScenarioError> for ApiError {
    fn from(err: ScenarioError) -> Self {
        match err {
            ScenarioError::NotFound(_) => Self::NotFound(err.to_string()),
        }
    }
}

pub(crate) fn mode_name(mode: ResponseMode) -> &'static str {
    match mode {
        ResponseMode::Live => "live",
        ResponseMode::Scripted => "scripted",
    }
}

/// List every practice scenario in catalog order.
#[utoipa::path(
    get,
    path = "/scenarios",
    responses(
        (status = 200, description = "The scenario catalog", body = [ScenarioInfo])
    )
)]
pub async fn list_scenarios(State(state): State<Arc<AppState>>) -> Json<Vec<ScenarioInfo>> {
    Json(
        state
            .scenarios
            .list_scenarios()
            .iter()
            .map(|s| ScenarioInfo::from(s.as_ref()))
            .collect(),
    )
}

/// Get a single scenario by its id.
#[utoipa::path(
    get,
    path = "/scenarios/{id}",
    responses(
        (status = 200, description = "Scenario details", body = ScenarioInfo),
        (status = 404, description = "Scenario not found", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Scenario id, e.g. `hpv-initial`")
    )
)]
pub async fn get_scenario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScenarioInfo>, ApiError> {
    let scenario = state.scenarios.get_scenario(&id)?;
    Ok(Json(ScenarioInfo::from(scenario.as_ref())))
}

/// Report whether the chat backend is reachable.
///
/// Returns the monitor's latest probe, probing now if none has finished yet.
#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Backend connection status", body = StatusReport)
    )
)]
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusReport> {
    let status = match state.monitor.latest() {
        Some(status) => status,
        None => state.monitor.check_now().await,
    };
    Json(StatusReport::new(
        status,
        mode_name(state.config.response_mode),
    ))
}
