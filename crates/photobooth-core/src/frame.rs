//! Frame source boundary.
//!
//! A frame source wraps a live capture device. The core only ever asks two
//! things of it: whether a frame is ready right now, and what that frame is.

use std::path::Path;

use image::RgbImage;
use tracing::{debug, info};

use crate::error::{BoothError, BoothResult, DeviceError};

/// A raw RGB24 frame, row-major, 3 bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }

    /// A frame filled with one colour.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb.iter().copied().cycle().take(Self::byte_len(width, height)).collect();
        Self { width, height, data }
    }

    /// RGB24 buffer size for the given dimensions
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    pub fn to_image(&self) -> BoothResult<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            BoothError::Encode(format!(
                "Frame buffer of {} bytes does not match {}x{}",
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }

    pub fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

/// Device state as last reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum DeviceStatus {
    Initializing,
    Ready,
    Failed(DeviceError),
}

/// Abstraction over a live video capture device.
pub trait FrameSource: Send {
    /// Current device state. Sources update this asynchronously.
    fn status(&self) -> DeviceStatus;

    /// The most recent frame, or `None` when the device has nothing ready.
    fn current_frame(&mut self) -> Option<Frame>;

    /// Re-open the device after a failure.
    fn restart(&mut self) -> Result<(), DeviceError> {
        match self.status() {
            DeviceStatus::Failed(e) => Err(e),
            _ => Ok(()),
        }
    }

    fn is_ready(&self) -> bool {
        self.status() == DeviceStatus::Ready
    }
}

/// Frame source backed by a fixed image. Used for headless sessions and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticFrameSource {
    frame: Option<Frame>,
    failure: Option<DeviceError>,
}

impl StaticFrameSource {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame: Some(frame),
            failure: None,
        }
    }

    /// A source that is still warming up and never yields a frame.
    pub fn not_ready() -> Self {
        Self::default()
    }

    pub fn failed(error: DeviceError) -> Self {
        Self {
            frame: None,
            failure: Some(error),
        }
    }

    /// Load the frame from an image file on disk.
    pub fn from_path(path: &Path) -> BoothResult<Self> {
        let image = image::open(path)
            .map_err(|e| BoothError::Device(DeviceError::Other(format!("{}: {e}", path.display()))))?
            .to_rgb8();
        info!("Loaded still frame {} ({}x{})", path.display(), image.width(), image.height());
        Ok(Self::new(Frame::from_image(image)))
    }
}

impl FrameSource for StaticFrameSource {
    fn status(&self) -> DeviceStatus {
        match (&self.failure, &self.frame) {
            (Some(e), _) => DeviceStatus::Failed(e.clone()),
            (None, Some(_)) => DeviceStatus::Ready,
            (None, None) => DeviceStatus::Initializing,
        }
    }

    fn current_frame(&mut self) -> Option<Frame> {
        if self.failure.is_some() {
            return None;
        }
        if self.frame.is_none() {
            debug!("Static source has no frame");
        }
        self.frame.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_frame_layout() {
        let frame = Frame::solid(4, 2, [10, 20, 30]);
        assert_eq!(frame.data.len(), 4 * 2 * 3);
        assert_eq!(&frame.data[..6], &[10, 20, 30, 10, 20, 30]);
        assert!(frame.to_image().is_ok());
    }

    #[test]
    fn test_byte_len_does_not_overflow_u32() {
        assert_eq!(Frame::byte_len(640, 480), 921_600);
        assert_eq!(Frame::byte_len(u32::MAX, 2), u32::MAX as usize * 6);
    }

    #[test]
    fn test_mismatched_buffer_rejected() {
        let frame = Frame::new(4, 4, vec![0; 5]);
        assert!(matches!(frame.to_image(), Err(BoothError::Encode(_))));
    }

    #[test]
    fn test_static_source_states() {
        let mut ready = StaticFrameSource::new(Frame::solid(2, 2, [0, 0, 0]));
        assert!(ready.is_ready());
        assert!(ready.current_frame().is_some());

        let mut warming = StaticFrameSource::not_ready();
        assert_eq!(warming.status(), DeviceStatus::Initializing);
        assert!(warming.current_frame().is_none());

        let mut denied = StaticFrameSource::failed(DeviceError::PermissionDenied);
        assert_eq!(denied.status(), DeviceStatus::Failed(DeviceError::PermissionDenied));
        assert!(denied.current_frame().is_none());
        assert_eq!(denied.restart(), Err(DeviceError::PermissionDenied));
    }
}
