//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{ErrorResponse, Persona, ScenarioInfo, StatusReport},
    state::AppState,
    ws::ws_handler,
};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_scenarios,
        handlers::get_scenario,
        handlers::get_status,
    ),
    components(
        schemas(ScenarioInfo, Persona, StatusReport, ErrorResponse)
    ),
    tags(
        (name = "SPARC-P API", description = "Scenario catalog and backend status for the SPARC-P communication trainer")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/scenarios", get(handlers::list_scenarios))
        .route("/scenarios/{id}", get(handlers::get_scenario))
        .route("/status", get(handlers::get_status))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_rest_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| *p == "/scenarios"));
        assert!(paths.iter().any(|p| *p == "/scenarios/{id}"));
        assert!(paths.iter().any(|p| *p == "/status"));
    }
}
