//! Session HTTP handlers.
//!
//! One session backs one open form. Every action returns the session's
//! [`InteractionSnapshot`] so the page can re-render from it; failed actions
//! return the snapshot inside the error body.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use poet_core::{defaults, InteractionController, InteractionSnapshot, PhotoReference};

use crate::{ApiError, AppState, ErrorResponse};

/// Multipart field carrying the uploaded photo.
const PHOTO_FIELD: &str = "photo";

/// A session id with its current state.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub state: InteractionSnapshot,
}

/// Request body for setting the photo by reference.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SetPhotoRequest {
    /// `data:image/...;base64,` URI or http(s) URL.
    pub photo_url: String,
}

/// Multipart upload form (documentation only).
#[allow(dead_code)]
#[derive(utoipa::ToSchema)]
pub struct UploadPhotoForm {
    /// Image file.
    #[schema(value_type = String, format = Binary)]
    pub photo: Vec<u8>,
}

async fn find_session(state: &AppState, id: Uuid) -> Result<Arc<InteractionController>, ApiError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", id)))
}

fn respond(id: Uuid, snapshot: InteractionSnapshot) -> Json<SessionResponse> {
    Json(SessionResponse {
        id,
        state: snapshot,
    })
}

/// Start a new form session.
///
/// # Returns
/// - 201 Created with the session id and its Idle state
#[utoipa::path(post, path = "/api/v1/sessions", tag = "Sessions",
    responses(
        (status = 201, description = "Session created", body = SessionResponse),
    ))]
pub async fn create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<SessionResponse>) {
    let (id, controller) = state.sessions.create().await;
    info!(session_id = %id, "Session started");
    (StatusCode::CREATED, respond(id, controller.snapshot()))
}

/// Get the current state of a session.
///
/// # Returns
/// - 200 OK with the session state
/// - 404 Not Found if the session does not exist or has expired
#[utoipa::path(get, path = "/api/v1/sessions/{id}", tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session state", body = SessionResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
    ))]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let controller = find_session(&state, id).await?;
    Ok(respond(id, controller.snapshot()))
}

/// End a session, abandoning any in-flight request.
///
/// # Returns
/// - 204 No Content
/// - 404 Not Found if the session does not exist
#[utoipa::path(delete, path = "/api/v1/sessions/{id}", tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 204, description = "Session ended"),
        (status = 404, description = "Session not found", body = ErrorResponse),
    ))]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(id).await {
        info!(session_id = %id, "Session ended");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Session {} not found", id)))
    }
}

/// Set the session photo from a data URI or URL.
///
/// Clears any analysis, poem, and error, and supersedes a pending request.
///
/// # Returns
/// - 200 OK with the new state (Idle)
/// - 400 Bad Request if `photo_url` is empty or not a data URI / http(s) URL
/// - 404 Not Found if the session does not exist
#[utoipa::path(put, path = "/api/v1/sessions/{id}/photo", tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session ID")),
    request_body = SetPhotoRequest,
    responses(
        (status = 200, description = "Photo set", body = SessionResponse),
        (status = 400, description = "Invalid photo reference", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
    ))]
pub async fn set_photo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetPhotoRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let controller = find_session(&state, id).await?;
    let photo = PhotoReference::parse(&req.photo_url)?;
    Ok(respond(id, controller.set_photo(photo)))
}

/// Upload a photo file.
///
/// The file is sniffed by its magic bytes and stored as a data URI; anything
/// that is not an image is rejected.
///
/// # Returns
/// - 200 OK with the new state (Idle)
/// - 400 Bad Request if the `photo` field is missing, empty, too large, or not an image
/// - 404 Not Found if the session does not exist
#[utoipa::path(post, path = "/api/v1/sessions/{id}/photo/upload", tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session ID")),
    request_body(content = UploadPhotoForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Photo uploaded", body = SessionResponse),
        (status = 400, description = "Invalid upload", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
    ))]
pub async fn upload_photo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<SessionResponse>, ApiError> {
    let controller = find_session(&state, id).await?;
    let max_bytes = state.config.max_upload_bytes;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?
    {
        if field.name() != Some(PHOTO_FIELD) {
            continue;
        }

        let declared = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file data: {}", e)))?;

        if data.is_empty() {
            return Err(ApiError::BadRequest("Uploaded photo is empty".to_string()));
        }
        if data.len() > max_bytes {
            warn!(session_id = %id, size = data.len(), max_bytes, "Upload too large");
            return Err(ApiError::BadRequest(format!(
                "Photo exceeds the {} byte upload limit",
                max_bytes
            )));
        }

        let photo = PhotoReference::from_image_bytes(&data, declared.as_deref())?;
        info!(session_id = %id, size = data.len(), "Photo uploaded");
        return Ok(respond(id, controller.set_photo(photo)));
    }

    Err(ApiError::BadRequest(format!(
        "Missing '{}' field in upload",
        PHOTO_FIELD
    )))
}

/// Clear the photo and everything derived from it.
///
/// # Returns
/// - 200 OK with the Idle state
/// - 404 Not Found if the session does not exist
#[utoipa::path(delete, path = "/api/v1/sessions/{id}/photo", tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session cleared", body = SessionResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
    ))]
pub async fn clear_photo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let controller = find_session(&state, id).await?;
    Ok(respond(id, controller.clear()))
}

/// Analyze the session photo.
///
/// Blocks until the analysis resolves, times out, or is superseded.
///
/// # Returns
/// - 200 OK with the Analyzed state
/// - 400 Bad Request if no photo is set
/// - 404 Not Found if the session does not exist
/// - 409 Conflict if a request is already running or this one was superseded
/// - 502 Bad Gateway if the model call failed or timed out
#[utoipa::path(post, path = "/api/v1/sessions/{id}/analyze", tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Photo analyzed", body = SessionResponse),
        (status = 400, description = "No photo", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Busy or superseded", body = ErrorResponse),
        (status = 502, description = "Analysis failed", body = ErrorResponse),
    ))]
pub async fn analyze(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let controller = find_session(&state, id).await?;
    match controller.request_analyze().await {
        Ok(snapshot) => Ok(respond(id, snapshot)),
        Err(e) => Err(ApiError::interaction(e, controller.snapshot())),
    }
}

/// Generate a poem from the session photo and its analysis.
///
/// # Returns
/// - 200 OK with the Generated state
/// - 404 Not Found if the session does not exist
/// - 409 Conflict if the photo has not been analyzed, a request is running,
///   or this one was superseded
/// - 502 Bad Gateway if the model call failed or timed out
#[utoipa::path(post, path = "/api/v1/sessions/{id}/poem", tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Poem generated", body = SessionResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Out of sequence, busy, or superseded", body = ErrorResponse),
        (status = 502, description = "Generation failed", body = ErrorResponse),
    ))]
pub async fn generate_poem(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let controller = find_session(&state, id).await?;
    match controller.request_generate().await {
        Ok(snapshot) => Ok(respond(id, snapshot)),
        Err(e) => Err(ApiError::interaction(e, controller.snapshot())),
    }
}

/// Abandon the in-flight request, if any.
///
/// # Returns
/// - 200 OK with the state the session returned to
/// - 404 Not Found if the session does not exist
#[utoipa::path(post, path = "/api/v1/sessions/{id}/cancel", tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Request cancelled", body = SessionResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
    ))]
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let controller = find_session(&state, id).await?;
    Ok(respond(id, controller.cancel()))
}

/// Save the poem (not available).
#[utoipa::path(post, path = "/api/v1/sessions/{id}/save", tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 501, description = "Not implemented", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
    ))]
pub async fn save_poem(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    find_session(&state, id).await?;
    Err(ApiError::NotImplemented(
        defaults::MSG_SAVE_UNAVAILABLE.to_string(),
    ))
}

/// Share the poem (not available).
#[utoipa::path(post, path = "/api/v1/sessions/{id}/share", tag = "Sessions",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 501, description = "Not implemented", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
    ))]
pub async fn share_poem(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    find_session(&state, id).await?;
    Err(ApiError::NotImplemented(
        defaults::MSG_SHARE_UNAVAILABLE.to_string(),
    ))
}
