//! Centralized default constants for photo-poet.
//!
//! **This module is the single source of truth** for shared default values.
//! The server and inference crates reference these constants instead of
//! defining their own magic numbers.

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP bind host.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default CORS max-age in seconds (1 hour).
pub const CORS_MAX_AGE_SECS: u64 = 3600;

/// Maximum accepted photo upload in bytes (10 MB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

// =============================================================================
// SESSIONS
// =============================================================================

/// Sessions idle longer than this are discarded.
pub const SESSION_IDLE_SECS: u64 = 3600;

/// Maximum number of live sessions; the least recently used is evicted.
pub const MAX_SESSIONS: usize = 1024;

/// Interval between idle-session sweeps.
pub const SESSION_SWEEP_SECS: u64 = 60;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default vision model (Ollama).
pub const VISION_MODEL: &str = "llava";

/// Default OpenAI-compatible base URL.
pub const OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default OpenAI-compatible vision model.
pub const OPENAI_GEN_MODEL: &str = "gpt-4o-mini";

/// Timeout for a single flow call in seconds.
pub const CALL_TIMEOUT_SECS: u64 = 120;

/// Timeout for backend HTTP generation requests in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 120;

/// Timeout for backend health checks in seconds.
pub const HEALTH_TIMEOUT_SECS: u64 = 5;

/// Generation slower than this is logged as slow.
pub const SLOW_GENERATION_MS: u64 = 30_000;

// =============================================================================
// USER-FACING MESSAGES
// =============================================================================

/// Shown when analyze or generate is requested without a photo.
pub const MSG_PHOTO_REQUIRED: &str = "Please upload a photo first.";

/// Shown when generate is requested before a successful analysis.
pub const MSG_ANALYSIS_REQUIRED: &str = "Please analyze the photo first.";

/// Shown when the analysis flow fails for any reason.
pub const MSG_ANALYSIS_FAILED: &str = "Error analyzing photo. Please try again.";

/// Shown when the poem flow fails for any reason.
pub const MSG_GENERATION_FAILED: &str = "Error generating poem. Please try again.";

/// Returned by the save stub.
pub const MSG_SAVE_UNAVAILABLE: &str = "Save functionality not implemented yet.";

/// Returned by the share stub.
pub const MSG_SHARE_UNAVAILABLE: &str = "Share functionality not implemented yet.";

// =============================================================================
// ENVIRONMENT VARIABLE NAMES
// =============================================================================

/// Environment variable selecting the inference backend ("ollama" or "openai").
pub const ENV_INFERENCE_BACKEND: &str = "POET_INFERENCE_BACKEND";

/// Environment variable for the Ollama vision model.
pub const ENV_OLLAMA_VISION_MODEL: &str = "OLLAMA_VISION_MODEL";

/// Environment variable overriding the backend HTTP timeout.
pub const ENV_GEN_TIMEOUT_SECS: &str = "POET_GEN_TIMEOUT_SECS";

/// Environment variable overriding the per-call flow timeout.
pub const ENV_CALL_TIMEOUT_SECS: &str = "POET_CALL_TIMEOUT_SECS";

/// Environment variable overriding the session idle timeout.
pub const ENV_SESSION_IDLE_SECS: &str = "POET_SESSION_IDLE_SECS";

/// Environment variable overriding the session capacity.
pub const ENV_MAX_SESSIONS: &str = "POET_MAX_SESSIONS";

/// Environment variable overriding the upload size limit.
pub const ENV_MAX_UPLOAD_BYTES: &str = "POET_MAX_UPLOAD_BYTES";

/// Environment variable allowing photo URLs on loopback or private networks.
pub const ENV_ALLOW_PRIVATE_IMAGE_HOSTS: &str = "POET_ALLOW_PRIVATE_IMAGE_HOSTS";
