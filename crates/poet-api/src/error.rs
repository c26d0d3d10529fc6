//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use poet_core::{Error, InteractionSnapshot};

/// Error body returned by every endpoint.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// User-facing message.
    pub error: String,
    /// Session state after the failed action (session endpoints only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<InteractionSnapshot>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    NotImplemented(String),
    Internal(String),
    /// A controller action failed; carries the resulting session state.
    Interaction {
        status: StatusCode,
        message: String,
        state: Box<InteractionSnapshot>,
    },
}

/// HTTP status for a core error.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::State(_) | Error::Cancelled(_) => StatusCode::CONFLICT,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        // Model output failed its schema; request bodies never reach the
        // validator as Validation errors.
        Error::Validation(_)
        | Error::Analysis(_)
        | Error::Generation(_)
        | Error::Inference(_)
        | Error::Request(_)
        | Error::Config(_) => StatusCode::BAD_GATEWAY,
        Error::Serialization(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    /// Wrap a controller failure with the session state it left behind.
    ///
    /// The message is the state's user-facing error when the controller
    /// recorded one, so the client shows the same text the form would.
    pub fn interaction(err: Error, state: InteractionSnapshot) -> Self {
        let message = match (&err, &state.error) {
            (Error::Cancelled(_), _) | (_, None) => err.to_string(),
            (_, Some(message)) => message.clone(),
        };
        ApiError::Interaction {
            status: status_for(&err),
            message,
            state: Box::new(state),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Interaction { status, .. } => *status,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let msg = err.to_string();
        match status_for(&err) {
            StatusCode::BAD_REQUEST => ApiError::BadRequest(msg),
            StatusCode::NOT_FOUND => ApiError::NotFound(msg),
            StatusCode::CONFLICT => ApiError::Conflict(msg),
            StatusCode::BAD_GATEWAY => ApiError::BadGateway(msg),
            StatusCode::NOT_IMPLEMENTED => ApiError::NotImplemented(msg),
            _ => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::BadGateway(msg)
            | ApiError::NotImplemented(msg)
            | ApiError::Internal(msg) => ErrorResponse {
                error: msg,
                state: None,
            },
            ApiError::Interaction { message, state, .. } => ErrorResponse {
                error: message,
                state: Some(*state),
            },
        };

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %body.error, "Request failed");
        }

        (status, Json(body)).into_response()
    }
}
