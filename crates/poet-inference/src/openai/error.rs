//! Classification of failed chat completions.
//!
//! Provider failures split into deployment problems (key, model) that an
//! operator must fix, photo problems the user can fix by choosing another
//! image, and transient provider trouble.

use poet_core::Error;

/// Why the provider refused a chat completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRejection {
    /// API key missing or not accepted.
    Unauthorized,
    /// Configured model does not exist for this key.
    UnknownModel,
    /// Prompt plus attached photo exceeded the context window.
    PhotoTooLarge,
    /// Provider could not download or decode the photo.
    UnreadablePhoto,
    /// Too many requests.
    Throttled,
    /// 5xx from the provider.
    Unavailable,
    Other,
}

impl ProviderRejection {
    /// Classify from the HTTP status and the provider's error `code`/`type`.
    pub fn classify(status: u16, kind: &str) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            429 => Self::Throttled,
            413 => Self::PhotoTooLarge,
            500..=599 => Self::Unavailable,
            _ if kind == "model_not_found" || status == 404 => Self::UnknownModel,
            _ if kind.contains("context_length") => Self::PhotoTooLarge,
            _ if kind.contains("image") => Self::UnreadablePhoto,
            _ => Self::Other,
        }
    }

    /// True when the photo, not the deployment or provider, is at fault.
    pub fn is_photo_problem(self) -> bool {
        matches!(self, Self::PhotoTooLarge | Self::UnreadablePhoto)
    }

    pub fn into_error(self, detail: &str) -> Error {
        match self {
            Self::Unauthorized => Error::Config(format!("Provider rejected the API key: {}", detail)),
            Self::UnknownModel => Error::Config(format!("Vision model unavailable: {}", detail)),
            Self::PhotoTooLarge => Error::InvalidInput(format!(
                "Photo is too large for the model, try a smaller image: {}",
                detail
            )),
            Self::UnreadablePhoto => {
                Error::InvalidInput(format!("Model could not read the photo: {}", detail))
            }
            Self::Throttled => Error::Inference(format!("Provider is rate limiting: {}", detail)),
            Self::Unavailable => Error::Inference(format!("Provider unavailable: {}", detail)),
            Self::Other => Error::Inference(detail.to_string()),
        }
    }
}
