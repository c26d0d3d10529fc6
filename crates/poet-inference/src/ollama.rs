//! Ollama vision backend implementation.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use poet_core::{Error, PhotoSource, Result, StructuredBackend, StructuredRequest};

use crate::image_fetch::ImageFetcher;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = poet_core::defaults::OLLAMA_URL;

/// Default vision model.
pub const DEFAULT_VISION_MODEL: &str = poet_core::defaults::VISION_MODEL;

/// Timeout for generation requests (seconds).
pub const GEN_TIMEOUT_SECS: u64 = poet_core::defaults::GEN_TIMEOUT_SECS;

/// Ollama backend speaking the `/api/chat` endpoint.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
    gen_timeout_secs: u64,
    images: ImageFetcher,
}

impl OllamaBackend {
    /// Create a new Ollama backend with default settings.
    pub fn new() -> Self {
        Self::with_config(
            DEFAULT_OLLAMA_URL.to_string(),
            DEFAULT_VISION_MODEL.to_string(),
        )
    }

    /// Create a new Ollama backend with custom configuration.
    pub fn with_config(base_url: String, model: String) -> Self {
        let gen_timeout = std::env::var(poet_core::defaults::ENV_GEN_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(GEN_TIMEOUT_SECS);

        info!(
            "Initializing Ollama backend: url={}, model={}",
            base_url, model
        );

        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            gen_timeout_secs: gen_timeout,
            images: ImageFetcher::from_env(Duration::from_secs(gen_timeout)),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        let base_url = std::env::var("OLLAMA_BASE")
            .or_else(|_| std::env::var("OLLAMA_URL"))
            .unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        let model = std::env::var(poet_core::defaults::ENV_OLLAMA_VISION_MODEL)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string());

        Self::with_config(base_url, model)
    }

    /// Override the generation timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.gen_timeout_secs = secs;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the fetcher used for remote photo URLs.
    pub fn with_image_fetcher(mut self, images: ImageFetcher) -> Self {
        self.images = images;
        self
    }

    /// Base64 payload for an attached image; remote images are downloaded.
    async fn image_payload(&self, image: &PhotoSource) -> Result<String> {
        match image {
            PhotoSource::Inline { data, .. } => Ok(encode(data)),
            PhotoSource::Remote(url) => Ok(encode(&self.images.fetch(url).await?)),
        }
    }
}

fn encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Chat API message for `/api/chat`.
#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
    /// Base64 images attached to this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// JSON Schema the response must conform to.
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
}

/// Response from the Ollama `/api/chat` endpoint.
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[async_trait]
impl StructuredBackend for OllamaBackend {
    #[instrument(skip(self, request), fields(subsystem = "inference", component = "ollama", op = "generate_structured", model = %self.model, prompt = %request.prompt_name, prompt_len = request.prompt.len()))]
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<String> {
        let start = Instant::now();

        let mut images = Vec::with_capacity(request.images.len());
        for image in &request.images {
            images.push(self.image_payload(image).await?);
        }

        debug!(image_count = images.len(), "Starting generation via chat API");

        let mut messages = Vec::new();
        if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
                images: Vec::new(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
            images,
        });

        let chat = ChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            format: Some(request.output_schema.clone()),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(Duration::from_secs(self.gen_timeout_secs))
            .json(&chat)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result.message.content;
        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            response_len = content.len(),
            duration_ms = elapsed,
            "Generation complete"
        );
        if elapsed > poet_core::defaults::SLOW_GENERATION_MS {
            warn!(
                duration_ms = elapsed,
                prompt_len = request.prompt.len(),
                slow = true,
                "Slow generation operation"
            );
        }
        Ok(content)
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(poet_core::defaults::HEALTH_TIMEOUT_SECS))
            .send()
            .await;

        match response {
            Ok(resp) => {
                if resp.status().is_success() {
                    info!("Ollama health check passed");
                    Ok(true)
                } else {
                    warn!("Ollama health check failed: {}", resp.status());
                    Ok(false)
                }
            }
            Err(e) => {
                warn!("Ollama health check error: {}", e);
                Ok(false)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poet_core::PoemResult;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // ==========================================================================
    // Configuration Tests
    // ==========================================================================

    #[test]
    fn test_default_constants() {
        assert_eq!(DEFAULT_OLLAMA_URL, "http://127.0.0.1:11434");
        assert_eq!(DEFAULT_VISION_MODEL, "llava");
        assert_eq!(GEN_TIMEOUT_SECS, 120);
    }

    #[test]
    fn test_custom_config_trims_trailing_slash() {
        let backend =
            OllamaBackend::with_config("http://gpu:11434/".to_string(), "qwen2.5vl".to_string());
        assert_eq!(backend.base_url(), "http://gpu:11434");
        assert_eq!(backend.model_name(), "qwen2.5vl");
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest {
            model: "llava".to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "Be brief.".to_string(),
                    images: vec![],
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: "Describe".to_string(),
                    images: vec!["aGVsbG8=".to_string()],
                },
            ],
            stream: false,
            format: Some(serde_json::json!({"type": "object"})),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llava");
        assert_eq!(json["stream"], false);
        assert_eq!(json["format"]["type"], "object");
        assert!(json["messages"][0].get("images").is_none());
        assert_eq!(json["messages"][1]["images"][0], "aGVsbG8=");
    }

    #[test]
    fn test_chat_response_deserialization() {
        let json = r#"{"model":"llava","message":{"role":"assistant","content":"{\"poem\":\"hi\"}"},"done":true}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.message.content, r#"{"poem":"hi"}"#);
        assert!(response.message.images.is_empty());
    }

    // ==========================================================================
    // HTTP Tests (wiremock)
    // ==========================================================================

    fn inline_request() -> StructuredRequest {
        StructuredRequest::for_output::<PoemResult>("poem_prompt", "Write a poem.").with_image(
            PhotoSource::Inline {
                mime_type: "image/png".to_string(),
                data: b"png-bytes".to_vec(),
            },
        )
    }

    #[tokio::test]
    async fn test_generate_structured_sends_schema_and_images() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "model": "llava",
                "stream": false,
                "format": {"type": "object", "required": ["poem"]},
                "messages": [{"role": "user", "images": [encode(b"png-bytes")]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": "{\"poem\":\"Soft light.\"}"},
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OllamaBackend::with_config(server.uri(), "llava".to_string());
        let raw = backend.generate_structured(&inline_request()).await.unwrap();
        assert_eq!(raw, r#"{"poem":"Soft light."}"#);
    }

    const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];

    /// Backend whose image fetches may reach the loopback mock server.
    fn local_backend(server: &MockServer, max_image_bytes: usize) -> OllamaBackend {
        OllamaBackend::with_config(server.uri(), "llava".to_string()).with_image_fetcher(
            ImageFetcher::new(max_image_bytes, Duration::from_secs(5)).with_private_hosts(true),
        )
    }

    #[tokio::test]
    async fn test_generate_structured_fetches_remote_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photos/cat.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_HEADER.to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "messages": [{"images": [encode(PNG_HEADER)]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": "{}"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = local_backend(&server, 1024);
        let request = StructuredRequest::for_output::<PoemResult>("poem_prompt", "Write.")
            .with_image(PhotoSource::Remote(format!("{}/photos/cat.png", server.uri())));
        assert_eq!(backend.generate_structured(&request).await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_oversized_remote_image_never_reaches_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/internal/admin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'A'; 64 * 1024]))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": "{}"}
            })))
            .expect(0)
            .mount(&server)
            .await;

        let request = StructuredRequest::for_output::<PoemResult>("poem_prompt", "Write.")
            .with_image(PhotoSource::Remote(format!("{}/internal/admin", server.uri())));

        let err = local_backend(&server, 1024)
            .generate_structured(&request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        // Default policy refuses the loopback host before downloading anything.
        let default_policy = OllamaBackend::with_config(server.uri(), "llava".to_string())
            .with_image_fetcher(ImageFetcher::new(1024 * 1024, Duration::from_secs(5)));
        let err = default_policy.generate_structured(&request).await.unwrap_err();
        assert!(err.to_string().contains("not publicly routable"));
    }

    #[tokio::test]
    async fn test_remote_image_not_found_is_inference_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let backend = local_backend(&server, 1024);
        let request = StructuredRequest::for_output::<PoemResult>("poem_prompt", "Write.")
            .with_image(PhotoSource::Remote(format!("{}/missing.jpg", server.uri())));
        let err = backend.generate_structured(&request).await.unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_server_error_is_inference_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model 'llava' not found"))
            .mount(&server)
            .await;

        let backend = OllamaBackend::with_config(server.uri(), "llava".to_string());
        let err = backend
            .generate_structured(&inline_request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Ollama returned 500"));
        assert!(err.to_string().contains("model 'llava' not found"));
    }

    #[tokio::test]
    async fn test_health_check_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"models": []})))
            .mount(&server)
            .await;

        let backend = OllamaBackend::with_config(server.uri(), "llava".to_string());
        assert!(backend.health_check().await.unwrap());

        let unreachable =
            OllamaBackend::with_config("http://127.0.0.1:9".to_string(), "llava".to_string());
        assert!(!unreachable.health_check().await.unwrap());
    }
}
