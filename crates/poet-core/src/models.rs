//! Data shapes exchanged with the model.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::{require_non_empty, FieldViolation, Schema};

/// Input of the photo analysis flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, utoipa::ToSchema)]
pub struct AnalyzePhotoInput {
    /// The URL of the photo to analyze.
    pub photo_url: String,
}

impl Schema for AnalyzePhotoInput {
    const NAME: &'static str = "AnalyzePhotoInput";

    fn refine(&self, violations: &mut Vec<FieldViolation>) {
        require_non_empty("photo_url", &self.photo_url, violations);
    }
}

/// Structured description of a photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, utoipa::ToSchema)]
pub struct AnalysisResult {
    /// Key objects identified in the photo.
    pub objects: Vec<String>,
    /// Key scenes identified in the photo.
    pub scenes: Vec<String>,
    /// Emotions detected in the photo.
    pub emotions: Vec<String>,
    /// A detailed description of the photo.
    pub description: String,
}

impl Schema for AnalysisResult {
    const NAME: &'static str = "AnalysisResult";
}

impl AnalysisResult {
    /// Serialized form embedded in the poem prompt and shown to the user.
    pub fn to_prompt_text(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Input of the poem generation flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, utoipa::ToSchema)]
pub struct GeneratePoemInput {
    /// The URL of the photo.
    pub photo_url: String,
    /// The AI analysis of the photo, including key objects, scenes, and emotions.
    pub photo_analysis: String,
}

impl Schema for GeneratePoemInput {
    const NAME: &'static str = "GeneratePoemInput";

    fn refine(&self, violations: &mut Vec<FieldViolation>) {
        require_non_empty("photo_url", &self.photo_url, violations);
        require_non_empty("photo_analysis", &self.photo_analysis, violations);
    }
}

/// Poem produced from a photo analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, utoipa::ToSchema)]
pub struct PoemResult {
    /// A poem inspired by the photo analysis.
    pub poem: String,
}

impl Schema for PoemResult {
    const NAME: &'static str = "PoemResult";

    fn refine(&self, violations: &mut Vec<FieldViolation>) {
        require_non_empty("poem", &self.poem, violations);
    }
}
