//! Health check and the web form.

use axum::{extract::State, response::Html, Json};
use serde::Serialize;
use tracing::warn;

use crate::AppState;

/// The single-page form.
const INDEX_HTML: &str = include_str!("../../static/index.html");

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    /// "healthy" when the model backend answers, otherwise "degraded".
    pub status: String,
    pub version: String,
    /// Model used for both flows.
    pub model: String,
    pub backend_healthy: bool,
}

/// Serve the Photo Poet form.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Report server and model backend health.
///
/// # Returns
/// - 200 OK with `status` "healthy" or "degraded"; the server itself is up
///   either way
#[utoipa::path(get, path = "/health", tag = "System",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse),
    ))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend_healthy = match state.backend.health_check().await {
        Ok(healthy) => healthy,
        Err(e) => {
            warn!(error = %e, "Backend health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if backend_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.backend.model_name().to_string(),
        backend_healthy,
    })
}
