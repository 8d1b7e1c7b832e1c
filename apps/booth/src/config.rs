//! Environment-driven configuration.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

pub const DEFAULT_UPLOAD_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoothConfig {
    /// Base URL of the remote store; uploads go to `{upload_url}/api/upload`
    pub upload_url: String,
    pub upload_timeout: Duration,
    pub camera_index: u32,
    /// Use this image instead of a camera
    pub still_image: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// Overrides the bundled caption font
    pub caption_font: Option<PathBuf>,
}

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            upload_timeout: Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
            camera_index: 0,
            still_image: None,
            output_dir: PathBuf::from("."),
            caption_font: None,
        }
    }
}

impl BoothConfig {
    /// Load configuration from environment variables
    /// Set PHOTOBOOTH_UPLOAD_URL=https://store.example.com
    /// Set PHOTOBOOTH_UPLOAD_TIMEOUT_SECS=30
    /// Set PHOTOBOOTH_CAMERA_INDEX=0
    /// Set PHOTOBOOTH_STILL_IMAGE=/path/to/frame.jpg
    /// Set PHOTOBOOTH_OUTPUT_DIR=/path/to/strips
    /// Set PHOTOBOOTH_CAPTION_FONT=/path/to/font.ttf
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let upload_url = non_empty("PHOTOBOOTH_UPLOAD_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.upload_url);

        let upload_timeout = match non_empty("PHOTOBOOTH_UPLOAD_TIMEOUT_SECS").map(|v| v.parse::<u64>()) {
            Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs),
            Some(_) => {
                warn!("Ignoring invalid PHOTOBOOTH_UPLOAD_TIMEOUT_SECS");
                defaults.upload_timeout
            }
            None => defaults.upload_timeout,
        };

        let camera_index = non_empty("PHOTOBOOTH_CAMERA_INDEX")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.camera_index);

        let config = Self {
            upload_url,
            upload_timeout,
            camera_index,
            still_image: non_empty("PHOTOBOOTH_STILL_IMAGE").map(PathBuf::from),
            output_dir: non_empty("PHOTOBOOTH_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            caption_font: non_empty("PHOTOBOOTH_CAPTION_FONT").map(PathBuf::from),
        };
        debug!("Loaded config: {:?}", config);
        config
    }
}
