//! OpenAI-compatible inference backend.
//!
//! Works with any chat-completions endpoint that accepts image content parts
//! and `response_format: json_schema`, including:
//!
//! - OpenAI cloud API
//! - OpenRouter
//! - Ollama (in OpenAI compatibility mode)
//! - vLLM
//!
//! # Example
//!
//! ```rust,no_run
//! use poet_inference::openai::{OpenAIBackend, OpenAIConfig};
//!
//! let config = OpenAIConfig {
//!     base_url: "http://localhost:11434/v1".to_string(), // Ollama
//!     gen_model: "llava".to_string(),
//!     ..Default::default()
//! };
//! let backend = OpenAIBackend::new(config).unwrap();
//! ```

mod backend;
mod error;
mod types;

pub use backend::{
    OpenAIBackend, OpenAIConfig, DEFAULT_GEN_MODEL, DEFAULT_OPENAI_URL, DEFAULT_TIMEOUT_SECS,
};
pub use error::ProviderRejection;
pub use types::*;
