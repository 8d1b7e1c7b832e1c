use thiserror::Error;

/// Why a capture device cannot deliver frames.
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DeviceError {
    #[error("Camera access denied. Please allow camera permissions.")]
    PermissionDenied,

    #[error("No camera found")]
    NotFound,

    #[error("Camera not supported on this system")]
    Unsupported,

    #[error("Camera error: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum BoothError {
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    #[error("No frame available from the capture device")]
    NoFrameAvailable,

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("Preprocessing failed: {0}")]
    Preprocess(String),

    #[error("Image encoding failed: {0}")]
    Encode(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Strip export failed: {0}")]
    Strip(String),
}

impl From<image::ImageError> for BoothError {
    fn from(e: image::ImageError) -> Self {
        BoothError::Encode(e.to_string())
    }
}

pub type BoothResult<T> = Result<T, BoothError>;
