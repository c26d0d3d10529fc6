use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use poet_api::{app, AppState, ServerConfig};
use poet_core::defaults;
use poet_inference::InferenceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "poet_api=debug,poet_inference=debug,poet_core=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "poet_api=debug,poet_inference=debug,poet_core=debug,tower_http=debug".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("poet-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    // Get configuration from environment
    let config = ServerConfig::from_env();
    let inference = InferenceConfig::from_env()?;
    let backend = inference.build_backend()?;

    info!(
        backend = %inference.backend,
        model = backend.model_name(),
        call_timeout_secs = config.call_timeout.as_secs(),
        max_sessions = config.max_sessions,
        "Inference backend configured"
    );

    match backend.health_check().await {
        Ok(true) => info!(model = backend.model_name(), "Model backend is reachable"),
        Ok(false) | Err(_) => warn!(
            model = backend.model_name(),
            "Model backend is not reachable; requests will fail until it is"
        ),
    }

    let addr = config.bind_addr();
    let listener = config.bind().await?;
    let state = AppState::new(backend, config);
    let _sweeper = state
        .sessions
        .spawn_sweeper(Duration::from_secs(defaults::SESSION_SWEEP_SECS));

    let router = app(state);

    // Start server
    info!("Starting server on {}", addr);
    axum::serve(listener, router).await?;

    Ok(())
}
