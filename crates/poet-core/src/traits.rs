//! Core traits for photo-poet abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable model backends and testable flows.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::models::{AnalysisResult, PoemResult};
use crate::photo::{PhotoReference, PhotoSource};
use crate::schema::{output_schema, Schema};

// =============================================================================
// AI CAPABILITY
// =============================================================================

/// A prompt plus the output shape the model must produce.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    /// Logical prompt name, for logs and provider-side schema naming.
    pub prompt_name: String,
    /// Optional system instruction.
    pub system: Option<String>,
    /// Rendered prompt text.
    pub prompt: String,
    /// Images attached to the prompt.
    pub images: Vec<PhotoSource>,
    /// Name of the output shape.
    pub schema_name: String,
    /// JSON Schema the response must conform to.
    pub output_schema: JsonValue,
}

impl StructuredRequest {
    /// Create a request whose response must conform to `T`.
    pub fn for_output<T: Schema>(prompt_name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            prompt_name: prompt_name.into(),
            system: None,
            prompt: prompt.into(),
            images: Vec::new(),
            schema_name: T::NAME.to_string(),
            output_schema: output_schema::<T>(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_image(mut self, image: PhotoSource) -> Self {
        self.images.push(image);
        self
    }
}

/// Backend that runs a prompt and returns schema-shaped output.
///
/// Implementations return the model's raw output text; callers validate it
/// against `request.output_schema` with [`crate::schema::parse_json_text`].
#[async_trait]
pub trait StructuredBackend: Send + Sync {
    /// Run the prompt and return the raw model output.
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<String>;

    /// Check if the backend is reachable.
    async fn health_check(&self) -> Result<bool>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

// =============================================================================
// FLOWS
// =============================================================================

/// The two prompt flows the interaction controller sequences.
#[async_trait]
pub trait PhotoFlows: Send + Sync {
    /// Identify objects, scenes, and emotions in a photo.
    async fn analyze_photo(&self, photo: &PhotoReference) -> Result<AnalysisResult>;

    /// Write a poem from a photo and its serialized analysis.
    async fn generate_poem(&self, photo: &PhotoReference, analysis_text: &str)
        -> Result<PoemResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_request_for_output_embeds_schema() {
        let request = StructuredRequest::for_output::<PoemResult>("poem_prompt", "Write.")
            .with_system("You are a poet.")
            .with_image(PhotoSource::Remote("https://example.com/a.png".to_string()));

        assert_eq!(request.prompt_name, "poem_prompt");
        assert_eq!(request.schema_name, "PoemResult");
        assert_eq!(request.system.as_deref(), Some("You are a poet."));
        assert_eq!(request.images.len(), 1);
        assert_eq!(request.output_schema["properties"]["poem"]["type"], "string");
    }
}
