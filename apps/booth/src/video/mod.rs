//! Frame sources for the studio.
//!
//! This module provides:
//! - Camera capture (via nokhwa, behind the `camera` feature) on a restartable worker thread
//! - Still-image sources for headless booths
//! - Mapping of device failures onto the core's `DeviceError`

#[cfg(feature = "camera")]
pub mod capture;
pub mod worker;

#[cfg(feature = "camera")]
pub use capture::open_camera;
pub use worker::ThreadedSource;

use photobooth_core::{DeviceError, FrameSource, StaticFrameSource};
use tracing::{error, info};

use crate::config::BoothConfig;

/// Default capture configuration
pub const DEFAULT_VIDEO_WIDTH: u32 = 640;
pub const DEFAULT_VIDEO_HEIGHT: u32 = 480;
pub const DEFAULT_VIDEO_FPS: u32 = 15;

/// Open the frame source described by `config`.
///
/// Never fails: an unusable device becomes a source reporting
/// `DeviceStatus::Failed`, so the studio can offer a retry.
pub fn open_source(config: &BoothConfig) -> Box<dyn FrameSource> {
    if let Some(path) = &config.still_image {
        return match StaticFrameSource::from_path(path) {
            Ok(source) => Box::new(source),
            Err(e) => {
                error!("Failed to load still image: {e}");
                Box::new(StaticFrameSource::failed(DeviceError::NotFound))
            }
        };
    }

    #[cfg(feature = "camera")]
    {
        info!("Opening camera {}", config.camera_index);
        Box::new(open_camera(config.camera_index))
    }

    #[cfg(not(feature = "camera"))]
    {
        tracing::warn!("Built without camera support and no PHOTOBOOTH_STILL_IMAGE set");
        info!("Camera {} unavailable", config.camera_index);
        Box::new(StaticFrameSource::failed(DeviceError::Unsupported))
    }
}

/// Map a driver error message onto the device error taxonomy.
pub fn classify_device_error(message: &str) -> DeviceError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        DeviceError::PermissionDenied
    } else if lower.contains("not found")
        || lower.contains("no such")
        || lower.contains("no device")
        || lower.contains("could not find")
    {
        DeviceError::NotFound
    } else if lower.contains("unsupported") || lower.contains("not supported") {
        DeviceError::Unsupported
    } else {
        DeviceError::Other(message.to_string())
    }
}
