//! Mock structured backend for deterministic testing.
//!
//! ## Usage
//!
//! ```rust
//! use poet_inference::mock::MockStructuredBackend;
//!
//! let backend = MockStructuredBackend::new()
//!     .with_prompt_response("poem_prompt", r#"{"poem":"Soft paws at rest."}"#)
//!     .with_latency_ms(10);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use poet_core::{Error, PhotoSource, Result, StructuredBackend, StructuredRequest};

/// Mock backend for testing.
#[derive(Clone)]
pub struct MockStructuredBackend {
    config: Arc<MockConfig>,
    queue: Arc<Mutex<VecDeque<Result<String>>>>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    model: String,
    prompt_responses: HashMap<String, String>,
    default_response: Option<String>,
    failure: Option<String>,
    latency_ms: u64,
    healthy: bool,
}

/// One recorded `generate_structured` call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub prompt_name: String,
    pub prompt: String,
    pub schema_name: String,
    pub images: Vec<PhotoSource>,
    pub timestamp: std::time::Instant,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            model: "mock-vision".to_string(),
            prompt_responses: HashMap::new(),
            default_response: None,
            failure: None,
            latency_ms: 0,
            healthy: true,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockStructuredBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the reported model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).model = model.into();
        self
    }

    /// Respond with `response` to any prompt without a specific mapping.
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = Some(response.into());
        self
    }

    /// Respond with `response` whenever `prompt_name` is requested.
    pub fn with_prompt_response(
        mut self,
        prompt_name: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .prompt_responses
            .insert(prompt_name.into(), response.into());
        self
    }

    /// Fail every call with an inference error.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).failure = Some(message.into());
        self
    }

    /// Set simulated latency for all calls.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Set the health check result.
    pub fn with_health(mut self, healthy: bool) -> Self {
        Arc::make_mut(&mut self.config).healthy = healthy;
        self
    }

    /// Queue a one-shot response; queued outcomes are used before any mapping.
    pub fn push_response(&self, response: impl Into<String>) {
        lock(&self.queue).push_back(Ok(response.into()));
    }

    /// Queue a one-shot failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        lock(&self.queue).push_back(Err(Error::Inference(message.into())));
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        lock(&self.call_log).clone()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        lock(&self.call_log).clear()
    }

    /// Number of `generate_structured` calls so far.
    pub fn call_count(&self) -> usize {
        lock(&self.call_log).len()
    }

    fn log_call(&self, request: &StructuredRequest) {
        lock(&self.call_log).push(MockCall {
            prompt_name: request.prompt_name.clone(),
            prompt: request.prompt.clone(),
            schema_name: request.schema_name.clone(),
            images: request.images.clone(),
            timestamp: std::time::Instant::now(),
        });
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }
}

impl Default for MockStructuredBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StructuredBackend for MockStructuredBackend {
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<String> {
        self.log_call(request);
        self.simulate_latency().await;

        if let Some(outcome) = lock(&self.queue).pop_front() {
            return outcome;
        }
        if let Some(message) = &self.config.failure {
            return Err(Error::Inference(message.clone()));
        }
        if let Some(response) = self.config.prompt_responses.get(&request.prompt_name) {
            return Ok(response.clone());
        }
        self.config.default_response.clone().ok_or_else(|| {
            Error::Inference(format!(
                "No mock response configured for {}",
                request.prompt_name
            ))
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.config.healthy)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
