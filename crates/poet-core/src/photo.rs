//! Photo references: data URIs from uploads or remote image URLs.

use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Opaque, validated reference to image content.
///
/// Either a `data:image/...;base64,` URI (what the upload form produces) or an
/// `http(s)://` URL. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhotoReference(String);

/// Where a backend finds the image bytes for a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoSource {
    /// Decoded image bytes with their MIME type.
    Inline { mime_type: String, data: Vec<u8> },
    /// URL the backend (or the model provider) must fetch.
    Remote(String),
}

impl PhotoReference {
    /// Validate a caller-supplied reference.
    pub fn parse(reference: impl AsRef<str>) -> Result<Self> {
        let reference = reference.as_ref().trim();
        if reference.is_empty() {
            return Err(Error::InvalidInput("Photo reference is required".to_string()));
        }

        if reference.starts_with("data:") {
            decode_data_uri(reference)?;
        } else if !(reference.starts_with("http://") || reference.starts_with("https://")) {
            return Err(Error::InvalidInput(
                "Photo reference must be a data: URI or an http(s) URL".to_string(),
            ));
        }

        Ok(Self(reference.to_string()))
    }

    /// Build a data URI reference from uploaded bytes.
    ///
    /// The MIME type is sniffed from magic bytes; `declared` is only used when
    /// the format is not recognized.
    pub fn from_image_bytes(data: &[u8], declared: Option<&str>) -> Result<Self> {
        let mime_type = image_mime_type(data, declared)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        Ok(Self(format!("data:{};base64,{}", mime_type, encoded)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for uploaded (data URI) photos.
    pub fn is_inline(&self) -> bool {
        self.0.starts_with("data:")
    }

    /// Resolve the reference into something a backend can attach.
    pub fn source(&self) -> Result<PhotoSource> {
        if self.is_inline() {
            let (mime_type, data) = decode_data_uri(&self.0)?;
            Ok(PhotoSource::Inline { mime_type, data })
        } else {
            Ok(PhotoSource::Remote(self.0.clone()))
        }
    }

    /// Short form for prompt text; uploads are summarized rather than inlined.
    pub fn prompt_label(&self) -> String {
        match self.source() {
            Ok(PhotoSource::Inline { mime_type, data }) => {
                format!("attached upload ({}, {} bytes)", mime_type, data.len())
            }
            _ => self.0.clone(),
        }
    }
}

impl fmt::Display for PhotoReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_inline() {
            let head: String = self.0.chars().take(32).collect();
            write!(f, "{}... ({} chars)", head, self.0.len())
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl TryFrom<String> for PhotoReference {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<PhotoReference> for String {
    fn from(value: PhotoReference) -> Self {
        value.0
    }
}

impl PhotoSource {
    /// Base64 payload or URL, as `image_url` style APIs expect.
    pub fn to_url(&self) -> String {
        match self {
            Self::Inline { mime_type, data } => format!(
                "data:{};base64,{}",
                mime_type,
                base64::engine::general_purpose::STANDARD.encode(data)
            ),
            Self::Remote(url) => url.clone(),
        }
    }
}

fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| Error::InvalidInput("Not a data URI".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::InvalidInput("Malformed data URI".to_string()))?;

    let mut params = header.split(';');
    let declared = params.next().unwrap_or_default().trim().to_ascii_lowercase();
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(Error::InvalidInput(
            "Only base64-encoded data URIs are supported".to_string(),
        ));
    }
    if !declared.starts_with("image/") {
        return Err(Error::InvalidInput(format!(
            "Photo must be an image, got '{}'",
            if declared.is_empty() { "text/plain" } else { declared.as_str() }
        )));
    }

    let data = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::InvalidInput(format!("Invalid base64 image data: {}", e)))?;
    let mime_type = image_mime_type(&data, Some(&declared))?;
    Ok((mime_type, data))
}

/// MIME type of downloaded image bytes.
///
/// Unlike uploads there is no declared type to fall back on: bytes that are
/// not recognized as an image are rejected.
pub fn sniff_image_type(data: &[u8]) -> Result<String> {
    image_mime_type(data, None)
}

fn image_mime_type(data: &[u8], declared: Option<&str>) -> Result<String> {
    if data.is_empty() {
        return Err(Error::InvalidInput("Image data is empty".to_string()));
    }

    match infer::get(data) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => {
            Ok(kind.mime_type().to_string())
        }
        Some(kind) => Err(Error::InvalidInput(format!(
            "Photo must be an image, detected '{}'",
            kind.mime_type()
        ))),
        None => match declared {
            Some(mime) if mime.starts_with("image/") => Ok(mime.to_string()),
            _ => Err(Error::InvalidInput("Unrecognized image format".to_string())),
        },
    }
}
