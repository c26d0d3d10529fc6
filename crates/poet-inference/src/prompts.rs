//! Prompt templates for the photo flows.

use serde_json::Value;

/// Name of the photo analysis prompt.
pub const ANALYZE_PHOTO_PROMPT: &str = "analyze_photo_prompt";

/// Name of the poem generation prompt.
pub const POEM_PROMPT: &str = "poem_prompt";

/// Upper bound on poem length, stated to the model only.
pub const MAX_POEM_LINES: usize = 20;

/// Prompt asking the model to identify objects, scenes, and emotions.
pub fn analyze_photo_prompt(photo_label: &str) -> String {
    format!(
        r#"You are an AI expert in understanding photos. Analyze the photo at the given URL and identify the key objects, scenes, and emotions present in the photo.

Provide a detailed description of the photo, including the identified objects, scenes, and emotions.

Photo URL: {photo_label}"#
    )
}

/// Prompt asking the model for a short poem from a photo analysis.
pub fn poem_prompt(photo_label: &str, photo_analysis: &str) -> String {
    format!(
        r#"You are a poet laureate. Given the following analysis of a photo, write a short poem that captures the essence and emotions of the image.

Photo URL: {photo_label}

Photo Analysis: {photo_analysis}

Write a poem that evokes the emotions of the photo analysis. The poem should not exceed {MAX_POEM_LINES} lines."#
    )
}

/// Trailer telling the model which JSON shape to produce.
pub fn output_instructions(schema: &Value) -> String {
    let schema_text = serde_json::to_string(schema).unwrap_or_default();
    format!(
        "\n\nOutput should be in JSON format and conform to the following schema:\n\n```\n{schema_text}\n```\n"
    )
}
