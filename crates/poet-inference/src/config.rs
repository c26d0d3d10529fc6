//! Inference configuration.
//!
//! Selects and configures the model backend from environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `POET_INFERENCE_BACKEND` | `ollama` | `ollama` or `openai` |
//! | `OLLAMA_BASE` | `http://127.0.0.1:11434` | Ollama endpoint |
//! | `OLLAMA_VISION_MODEL` | `llava` | Ollama vision model |
//! | `POET_MAX_UPLOAD_BYTES` | `10485760` | Size cap for remote photos fetched by Ollama |
//! | `POET_ALLOW_PRIVATE_IMAGE_HOSTS` | `false` | Let Ollama fetch photos from loopback/private hosts |
//! | `OPENAI_BASE_URL` | `https://api.openai.com/v1` | OpenAI-compatible endpoint |
//! | `OPENAI_GEN_MODEL` | `gpt-4o-mini` | OpenAI-compatible vision model |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use poet_core::defaults;
use poet_core::StructuredBackend;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid backend: {0}")]
    InvalidBackend(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backend '{0}' is not compiled in (enable the '{0}' feature)")]
    FeatureDisabled(BackendKind),

    #[error("Failed to initialize backend: {0}")]
    Backend(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Inference backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Ollama,
    OpenAI,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(ConfigError::InvalidBackend(s.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAI => write!(f, "openai"),
        }
    }
}

/// Resolved backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceConfig {
    pub backend: BackendKind,
    /// Endpoint of the selected backend.
    pub base_url: String,
    /// Vision model of the selected backend.
    pub model: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Ollama,
            base_url: defaults::OLLAMA_URL.to_string(),
            model: defaults::VISION_MODEL.to_string(),
        }
    }
}

impl InferenceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match get(defaults::ENV_INFERENCE_BACKEND) {
            Some(name) => name.parse()?,
            None => BackendKind::default(),
        };

        let config = match backend {
            BackendKind::Ollama => Self {
                backend,
                base_url: get("OLLAMA_BASE")
                    .or_else(|| get("OLLAMA_URL"))
                    .unwrap_or_else(|| defaults::OLLAMA_URL.to_string()),
                model: get(defaults::ENV_OLLAMA_VISION_MODEL)
                    .unwrap_or_else(|| defaults::VISION_MODEL.to_string()),
            },
            BackendKind::OpenAI => Self {
                backend,
                base_url: get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| defaults::OPENAI_URL.to_string()),
                model: get("OPENAI_GEN_MODEL")
                    .unwrap_or_else(|| defaults::OPENAI_GEN_MODEL.to_string()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{} base URL must start with http:// or https://, got: {}",
                self.backend, self.base_url
            )));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{} model cannot be empty",
                self.backend
            )));
        }

        Ok(())
    }

    /// Construct the selected backend.
    pub fn build_backend(&self) -> ConfigResult<Arc<dyn StructuredBackend>> {
        info!(
            backend = %self.backend,
            url = %self.base_url,
            model = %self.model,
            "Building inference backend"
        );

        match self.backend {
            #[cfg(feature = "ollama")]
            BackendKind::Ollama => Ok(Arc::new(crate::ollama::OllamaBackend::with_config(
                self.base_url.clone(),
                self.model.clone(),
            ))),
            #[cfg(feature = "openai")]
            BackendKind::OpenAI => {
                let config = crate::openai::OpenAIConfig {
                    base_url: self.base_url.clone(),
                    gen_model: self.model.clone(),
                    ..crate::openai::OpenAIConfig::from_env()
                };
                let backend = crate::openai::OpenAIBackend::new(config)
                    .map_err(|e| ConfigError::Backend(e.to_string()))?;
                Ok(Arc::new(backend))
            }
            #[allow(unreachable_patterns)]
            other => Err(ConfigError::FeatureDisabled(other)),
        }
    }
}
