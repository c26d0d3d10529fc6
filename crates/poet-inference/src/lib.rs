//! # poet-inference
//!
//! Model backends and prompt flows for photo-poet.
//!
//! This crate provides:
//! - The photo analysis and poem generation flows
//! - Prompt templates
//! - Ollama implementation (default), with bounded download of remote photos
//! - OpenAI-compatible implementation (optional, feature `openai`)
//! - Backend selection from environment variables
//!
//! # Feature Flags
//!
//! - `ollama` (default): Enable Ollama backend
//! - `openai`: Enable OpenAI-compatible backend
//! - `mock`: Expose [`mock::MockStructuredBackend`] to dependent crates
//!
//! # Example
//!
//! ```rust,no_run
//! use poet_inference::{analyze_photo, OllamaBackend};
//! use poet_core::PhotoReference;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OllamaBackend::from_env();
//!     let photo = PhotoReference::parse("https://example.com/cat.jpg").unwrap();
//!     let analysis = analyze_photo(&backend, &photo).await.unwrap();
//!     println!("{:?}", analysis.objects);
//! }
//! ```

pub mod config;
pub mod flows;
pub mod prompts;

#[cfg(feature = "ollama")]
pub mod image_fetch;
#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

// Mock backend for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use poet_core::*;

pub use config::{BackendKind, ConfigError, InferenceConfig};
pub use flows::{analyze_photo, generate_poem, PoetFlows};

#[cfg(feature = "ollama")]
pub use image_fetch::ImageFetcher;
#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

#[cfg(feature = "openai")]
pub use openai::{OpenAIBackend, OpenAIConfig};
