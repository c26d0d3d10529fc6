//! Stateless flow handlers.
//!
//! Run a single flow without a session, for scripting and tooling. Each call
//! is bounded by the same deadline as session requests.

use std::future::Future;

use axum::{extract::State, Json};
use serde_json::Value;
use tracing::warn;

use poet_core::schema::{self, Schema};
use poet_core::{
    AnalysisResult, AnalyzePhotoInput, Error, GeneratePoemInput, PhotoReference, PoemResult,
    Result,
};

use crate::{ApiError, AppState, ErrorResponse};

/// Check a request body against its schema; violations are the caller's fault.
fn parse_body<T: Schema>(body: Value) -> std::result::Result<T, ApiError> {
    schema::parse(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Bound a flow call; expiry is reported as a failure of that stage.
async fn with_deadline<T>(
    state: &AppState,
    stage_error: fn(String) -> Error,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    let timeout = state.config.call_timeout;
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "Flow call timed out");
            Err(stage_error(format!("timed out after {:?}", timeout)))
        }
    }
}

/// Identify the objects, scenes, and emotions in a photo.
///
/// # Request Body
/// - `photo_url`: data URI or http(s) URL (required)
///
/// # Returns
/// - 200 OK with the analysis
/// - 400 Bad Request if `photo_url` is missing or malformed
/// - 502 Bad Gateway if the model call failed, timed out, or returned
///   malformed output
#[utoipa::path(post, path = "/api/v1/flows/analyze-photo", tag = "Flows",
    request_body = AnalyzePhotoInput,
    responses(
        (status = 200, description = "Photo analyzed", body = AnalysisResult),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 502, description = "Analysis failed", body = ErrorResponse),
    ))]
pub async fn analyze_photo(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> std::result::Result<Json<AnalysisResult>, ApiError> {
    let req: AnalyzePhotoInput = parse_body(body)?;
    let photo = PhotoReference::parse(&req.photo_url)?;
    let analysis = with_deadline(&state, Error::Analysis, state.flows.analyze_photo(&photo)).await?;
    Ok(Json(analysis))
}

/// Write a short poem from a photo and its analysis.
///
/// # Request Body
/// - `photo_url`: data URI or http(s) URL (required)
/// - `photo_analysis`: analysis text, usually a serialized `AnalysisResult` (required)
///
/// # Returns
/// - 200 OK with the poem
/// - 400 Bad Request if either field is missing or empty
/// - 502 Bad Gateway if the model call failed, timed out, or returned
///   malformed output
#[utoipa::path(post, path = "/api/v1/flows/generate-poem", tag = "Flows",
    request_body = GeneratePoemInput,
    responses(
        (status = 200, description = "Poem generated", body = PoemResult),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 502, description = "Generation failed", body = ErrorResponse),
    ))]
pub async fn generate_poem(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> std::result::Result<Json<PoemResult>, ApiError> {
    let req: GeneratePoemInput = parse_body(body)?;
    let photo = PhotoReference::parse(&req.photo_url)?;
    let poem = with_deadline(
        &state,
        Error::Generation,
        state.flows.generate_poem(&photo, &req.photo_analysis),
    )
    .await?;
    Ok(Json(poem))
}
