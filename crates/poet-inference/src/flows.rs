//! The two prompt flows: photo analysis and poem generation.
//!
//! Each flow validates its input, renders its prompt, attaches the photo, asks
//! the backend for schema-shaped output, and validates the response. Flows are
//! stateless and never retry.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use poet_core::schema::{self, Schema};
use poet_core::{
    AnalysisResult, AnalyzePhotoInput, Error, GeneratePoemInput, PhotoFlows, PhotoReference,
    PoemResult, Result, StructuredBackend, StructuredRequest,
};

use crate::prompts;

/// Identify key objects, scenes, and emotions in a photo.
#[instrument(skip(backend, photo), fields(subsystem = "inference", op = "analyze_photo", prompt = prompts::ANALYZE_PHOTO_PROMPT, model = %backend.model_name()))]
pub async fn analyze_photo(
    backend: &dyn StructuredBackend,
    photo: &PhotoReference,
) -> Result<AnalysisResult> {
    let input = AnalyzePhotoInput {
        photo_url: photo.as_str().to_string(),
    };
    schema::validate(&input).map_err(|e| Error::InvalidInput(e.to_string()))?;

    let prompt = prompts::analyze_photo_prompt(&photo.prompt_label());
    let request = structured_request::<AnalysisResult>(prompts::ANALYZE_PHOTO_PROMPT, prompt, photo)?;

    let raw = run(backend, &request)
        .await
        .map_err(|e| Error::Analysis(e.to_string()))?;
    let analysis: AnalysisResult = parse_output(&raw)?;

    info!(
        objects = analysis.objects.len(),
        scenes = analysis.scenes.len(),
        emotions = analysis.emotions.len(),
        "Photo analysis complete"
    );
    Ok(analysis)
}

/// Write a short poem from a photo and its serialized analysis.
///
/// `photo_analysis` is embedded in the prompt verbatim; it is not re-parsed.
#[instrument(skip(backend, photo, photo_analysis), fields(subsystem = "inference", op = "generate_poem", prompt = prompts::POEM_PROMPT, model = %backend.model_name(), analysis_len = photo_analysis.len()))]
pub async fn generate_poem(
    backend: &dyn StructuredBackend,
    photo: &PhotoReference,
    photo_analysis: &str,
) -> Result<PoemResult> {
    let input = GeneratePoemInput {
        photo_url: photo.as_str().to_string(),
        photo_analysis: photo_analysis.to_string(),
    };
    schema::validate(&input).map_err(|e| Error::InvalidInput(e.to_string()))?;

    let prompt = prompts::poem_prompt(&photo.prompt_label(), photo_analysis);
    let request = structured_request::<PoemResult>(prompts::POEM_PROMPT, prompt, photo)?;

    let raw = run(backend, &request)
        .await
        .map_err(|e| Error::Generation(e.to_string()))?;
    let poem: PoemResult = parse_output(&raw)?;

    info!(lines = poem.poem.lines().count(), "Poem generation complete");
    Ok(poem)
}

fn structured_request<T: Schema>(
    prompt_name: &str,
    prompt: String,
    photo: &PhotoReference,
) -> Result<StructuredRequest> {
    let mut request = StructuredRequest::for_output::<T>(prompt_name, prompt);
    request.prompt.push_str(&prompts::output_instructions(&request.output_schema));
    Ok(request.with_image(photo.source()?))
}

async fn run(backend: &dyn StructuredBackend, request: &StructuredRequest) -> Result<String> {
    let start = Instant::now();
    let outcome = backend.generate_structured(request).await;
    let elapsed = start.elapsed().as_millis() as u64;
    match &outcome {
        Ok(raw) => debug!(
            response_len = raw.len(),
            duration_ms = elapsed,
            "Model call complete"
        ),
        Err(e) => warn!(error = %e, duration_ms = elapsed, "Model call failed"),
    }
    outcome
}

fn parse_output<T: Schema>(raw: &str) -> Result<T> {
    schema::parse_json_text::<T>(raw).map_err(|e| {
        warn!(schema = T::NAME, error = %e, "Model output rejected");
        Error::Validation(e)
    })
}

/// [`PhotoFlows`] backed by a single [`StructuredBackend`].
#[derive(Clone)]
pub struct PoetFlows {
    backend: Arc<dyn StructuredBackend>,
}

impl PoetFlows {
    pub fn new(backend: Arc<dyn StructuredBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn StructuredBackend> {
        &self.backend
    }
}

#[async_trait]
impl PhotoFlows for PoetFlows {
    async fn analyze_photo(&self, photo: &PhotoReference) -> Result<AnalysisResult> {
        analyze_photo(self.backend.as_ref(), photo).await
    }

    async fn generate_poem(
        &self,
        photo: &PhotoReference,
        analysis_text: &str,
    ) -> Result<PoemResult> {
        generate_poem(self.backend.as_ref(), photo, analysis_text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockStructuredBackend;
    use poet_core::PhotoSource;

    const CAT_JSON: &str = r#"{"objects":["cat"],"scenes":["indoor"],"emotions":["calm"],"description":"A cat resting."}"#;

    fn photo() -> PhotoReference {
        PhotoReference::parse("https://example.com/cat.jpg").unwrap()
    }

    fn cat_analysis() -> AnalysisResult {
        AnalysisResult {
            objects: vec!["cat".to_string()],
            scenes: vec!["indoor".to_string()],
            emotions: vec!["calm".to_string()],
            description: "A cat resting.".to_string(),
        }
    }

    #[tokio::test]
    async fn test_analyze_photo_returns_all_fields() {
        let backend = MockStructuredBackend::new().with_response(CAT_JSON);

        let analysis = analyze_photo(&backend, &photo()).await.unwrap();
        assert_eq!(analysis, cat_analysis());

        let calls = backend.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].prompt_name, prompts::ANALYZE_PHOTO_PROMPT);
        assert_eq!(calls[0].schema_name, "AnalysisResult");
        assert!(calls[0].prompt.contains("Photo URL: https://example.com/cat.jpg"));
        assert_eq!(
            calls[0].images,
            vec![PhotoSource::Remote("https://example.com/cat.jpg".to_string())]
        );
    }

    #[tokio::test]
    async fn test_analyze_photo_accepts_fenced_output() {
        let backend =
            MockStructuredBackend::new().with_response(format!("```json\n{}\n```", CAT_JSON));
        let analysis = analyze_photo(&backend, &photo()).await.unwrap();
        assert_eq!(analysis.objects, vec!["cat"]);
    }

    #[tokio::test]
    async fn test_analyze_photo_partial_output_is_validation_error() {
        let backend = MockStructuredBackend::new()
            .with_response(r#"{"objects":["cat"],"description":"A cat."}"#);

        match analyze_photo(&backend, &photo()).await {
            Err(Error::Validation(e)) => {
                assert_eq!(e.schema, "AnalysisResult");
                assert_eq!(e.paths(), vec!["emotions", "scenes"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_analyze_photo_backend_failure_is_analysis_error() {
        let backend = MockStructuredBackend::new().with_failure("connection refused");
        let err = analyze_photo(&backend, &photo()).await.unwrap_err();
        assert!(matches!(err, Error::Analysis(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_generate_poem_embeds_analysis() {
        let backend =
            MockStructuredBackend::new().with_response(r#"{"poem":"Soft paws at rest."}"#);
        let analysis_text = cat_analysis().to_prompt_text().unwrap();

        let poem = generate_poem(&backend, &photo(), &analysis_text)
            .await
            .unwrap();
        assert_eq!(poem.poem, "Soft paws at rest.");

        let calls = backend.get_calls();
        assert_eq!(calls[0].prompt_name, prompts::POEM_PROMPT);
        assert!(calls[0].prompt.contains(&analysis_text));
        assert!(calls[0].prompt.contains("should not exceed 20 lines"));
    }

    #[tokio::test]
    async fn test_generate_poem_empty_analysis_never_calls_backend() {
        let backend = MockStructuredBackend::new().with_response(r#"{"poem":"x"}"#);

        let err = generate_poem(&backend, &photo(), "  ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generate_poem_blank_poem_is_validation_error() {
        let backend = MockStructuredBackend::new().with_response(r#"{"poem":""}"#);
        let err = generate_poem(&backend, &photo(), "{}").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_generate_poem_backend_failure_is_generation_error() {
        let backend = MockStructuredBackend::new().with_failure("model not loaded");
        let err = generate_poem(&backend, &photo(), "{}").await.unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }

    #[tokio::test]
    async fn test_poet_flows_delegates_to_backend() {
        let backend = MockStructuredBackend::new()
            .with_prompt_response(prompts::ANALYZE_PHOTO_PROMPT, CAT_JSON)
            .with_prompt_response(prompts::POEM_PROMPT, r#"{"poem":"Quiet fur."}"#);
        let flows = PoetFlows::new(Arc::new(backend.clone()));

        let analysis = flows.analyze_photo(&photo()).await.unwrap();
        let text = analysis.to_prompt_text().unwrap();
        let poem = flows.generate_poem(&photo(), &text).await.unwrap();

        assert_eq!(poem.poem, "Quiet fur.");
        assert_eq!(backend.call_count(), 2);
        assert_eq!(flows.backend().model_name(), "mock-vision");
    }
}
