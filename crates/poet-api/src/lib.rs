//! # poet-api
//!
//! HTTP server for photo-poet: the single-page form, a session API over the
//! interaction controller, stateless flow endpoints, and Swagger UI.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use poet_core::{defaults, PhotoFlows, StructuredBackend};
use poet_inference::PoetFlows;

pub mod config;
pub mod error;
pub mod handlers;
pub mod services;

pub use config::ServerConfig;
pub use error::{ApiError, ErrorResponse};
pub use services::SessionStore;

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// STATE
// =============================================================================

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub backend: Arc<dyn StructuredBackend>,
    pub flows: Arc<dyn PhotoFlows>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(backend: Arc<dyn StructuredBackend>, config: ServerConfig) -> Self {
        let flows: Arc<dyn PhotoFlows> = Arc::new(PoetFlows::new(Arc::clone(&backend)));
        let sessions = SessionStore::new(
            Arc::clone(&flows),
            config.max_sessions,
            config.session_idle,
            config.call_timeout,
        );
        Self {
            sessions,
            backend,
            flows,
            config: Arc::new(config),
        }
    }
}

// =============================================================================
// OPENAPI
// =============================================================================

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Photo Poet API",
        description = "Analyze a photo with a vision model and turn the analysis into a short poem"
    ),
    paths(
        handlers::system::health_check,
        handlers::sessions::create_session,
        handlers::sessions::get_session,
        handlers::sessions::delete_session,
        handlers::sessions::set_photo,
        handlers::sessions::upload_photo,
        handlers::sessions::clear_photo,
        handlers::sessions::analyze,
        handlers::sessions::generate_poem,
        handlers::sessions::cancel,
        handlers::sessions::save_poem,
        handlers::sessions::share_poem,
        handlers::flows::analyze_photo,
        handlers::flows::generate_poem,
    ),
    components(schemas(
        poet_core::AnalyzePhotoInput,
        poet_core::AnalysisResult,
        poet_core::GeneratePoemInput,
        poet_core::PoemResult,
        poet_core::InteractionSnapshot,
        poet_core::Phase,
        handlers::sessions::SessionResponse,
        handlers::sessions::SetPhotoRequest,
        handlers::sessions::UploadPhotoForm,
        handlers::system::HealthResponse,
        ErrorResponse,
    )),
    tags(
        (name = "Sessions", description = "Upload, analyze, and generate within one form session"),
        (name = "Flows", description = "Stateless analysis and poem generation"),
        (name = "System", description = "Health and metadata"),
    )
)]
pub struct ApiDoc;

// =============================================================================
// ROUTER
// =============================================================================

/// Parse a comma-separated CORS origin list.
///
/// Invalid entries are skipped with a warning. An empty list falls back to
/// [`config::DEFAULT_ALLOWED_ORIGINS`].
///
/// ```text
/// ALLOWED_ORIGINS=https://poet.example.com,http://localhost:3000
/// ```
pub fn parse_allowed_origins(origins_str: &str) -> Vec<HeaderValue> {
    let origins_str = if origins_str.trim().is_empty() {
        config::DEFAULT_ALLOWED_ORIGINS
    } else {
        origins_str
    };

    origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
                tracing::warn!("Invalid CORS origin '{}': missing scheme", trimmed);
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

/// Largest request body: a maximal photo as a base64 data URI, plus framing.
fn request_body_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes.div_ceil(3) * 4 + 64 * 1024
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let allowed_origins = parse_allowed_origins(&state.config.allowed_origins);
    let body_limit = request_body_limit(state.config.max_upload_bytes);

    Router::new()
        // Form
        .route("/", get(handlers::system::index))
        // Health check
        .route("/health", get(handlers::system::health_check))
        // OpenAPI / Swagger UI
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Sessions
        .route("/api/v1/sessions", post(handlers::sessions::create_session))
        .route(
            "/api/v1/sessions/:id",
            get(handlers::sessions::get_session).delete(handlers::sessions::delete_session),
        )
        .route(
            "/api/v1/sessions/:id/photo",
            axum::routing::put(handlers::sessions::set_photo)
                .delete(handlers::sessions::clear_photo),
        )
        .route(
            "/api/v1/sessions/:id/photo/upload",
            post(handlers::sessions::upload_photo),
        )
        .route("/api/v1/sessions/:id/analyze", post(handlers::sessions::analyze))
        .route("/api/v1/sessions/:id/poem", post(handlers::sessions::generate_poem))
        .route("/api/v1/sessions/:id/cancel", post(handlers::sessions::cancel))
        .route("/api/v1/sessions/:id/save", post(handlers::sessions::save_poem))
        .route("/api/v1/sessions/:id/share", post(handlers::sessions::share_poem))
        // Stateless flows
        .route(
            "/api/v1/flows/analyze-photo",
            post(handlers::flows::analyze_photo),
        )
        .route(
            "/api/v1/flows/generate-poem",
            post(handlers::flows::generate_poem),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(allowed_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
                .allow_credentials(true)
                .max_age(Duration::from_secs(defaults::CORS_MAX_AGE_SECS)),
        )
        // Photos arrive as multipart files or base64 data URIs
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
