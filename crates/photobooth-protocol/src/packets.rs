use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Path of the upload route, relative to the configured endpoint base URL.
pub const UPLOAD_PATH: &str = "/api/upload";

/// Raw bodies quoted in protocol errors are cut to this many characters.
pub const MAX_QUOTED_BODY: usize = 200;

/// One image in an upload request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadImage {
    /// `data:image/jpeg;base64,...` payload
    pub src: String,
    /// Name of the filter the shot was rendered with
    pub filter: String,
}

/// Body of `POST /api/upload`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub images: Vec<UploadImage>,
}

/// Per-image entry of a successful response, aligned by index with the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUploadResult {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub uploaded: bool,
}

impl ImageUploadResult {
    fn missing() -> Self {
        Self {
            url: None,
            uploaded: false,
        }
    }
}

/// Structured response body. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub results: Vec<ImageUploadResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadError {
    /// The request never completed
    #[error("{message}")]
    Transport { message: String },

    /// A response arrived but its body was not the expected JSON object
    #[error("Invalid response from server (HTTP {status}): {body}")]
    Protocol { status: u16, body: String },

    /// The server answered with a failure
    #[error("{message}")]
    Server { status: u16, message: String },
}

/// Result of one upload attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub succeeded: bool,
    pub results: Vec<ImageUploadResult>,
    pub error: Option<UploadError>,
}

impl UploadOutcome {
    pub fn success(results: Vec<ImageUploadResult>) -> Self {
        Self {
            succeeded: true,
            results,
            error: None,
        }
    }

    pub fn failure(error: UploadError) -> Self {
        Self {
            succeeded: false,
            results: Vec::new(),
            error: Some(error),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::failure(UploadError::Transport {
            message: message.into(),
        })
    }

    /// Human-readable failure text, if any
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    /// Number of images the server reports as stored
    pub fn uploaded_count(&self) -> usize {
        self.results.iter().filter(|r| r.uploaded).count()
    }
}

/// Classify a completed HTTP exchange.
///
/// `image_count` is the number of images that were sent; per-image results
/// are padded (or cut) to that length so they stay index-aligned.
pub fn interpret_response(status: u16, body: &str, image_count: usize) -> UploadOutcome {
    let is_success = (200..300).contains(&status);

    let parsed = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) if value.is_object() => serde_json::from_value::<UploadResponse>(value).ok(),
        _ => None,
    };

    let Some(response) = parsed else {
        warn!("Upload response (HTTP {status}) is not a JSON object");
        return UploadOutcome::failure(UploadError::Protocol {
            status,
            body: quote_body(body),
        });
    };

    if is_success && response.success {
        let mut results = response.results;
        if results.len() != image_count {
            debug!(
                "Server returned {} results for {} images, aligning",
                results.len(),
                image_count
            );
        }
        results.resize_with(image_count, ImageUploadResult::missing);
        return UploadOutcome::success(results);
    }

    let message = match response.error {
        Some(message) if !message.trim().is_empty() => message,
        _ => format!("Upload failed with status {status}"),
    };

    UploadOutcome::failure(UploadError::Server { status, message })
}

fn quote_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    match trimmed.char_indices().nth(MAX_QUOTED_BODY) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
