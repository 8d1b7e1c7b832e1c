//! Camera-backed frame source using nokhwa.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use photobooth_core::{DeviceError, Frame};
use tracing::{debug, info, warn};

use super::worker::{CaptureContext, CaptureLoop, ThreadedSource};
use super::{classify_device_error, DEFAULT_VIDEO_FPS, DEFAULT_VIDEO_HEIGHT, DEFAULT_VIDEO_WIDTH};

/// Live camera on a background thread that keeps the most recent frame.
pub fn open_camera(device_index: u32) -> ThreadedSource {
    let capture: Arc<CaptureLoop> = Arc::new(move |ctx: &CaptureContext| capture_loop(device_index, ctx));
    ThreadedSource::spawn("booth-camera", capture)
}

fn capture_loop(device_index: u32, ctx: &CaptureContext) -> Result<(), DeviceError> {
    info!("CAMERA: Opening device index {}", device_index);

    let target_format = CameraFormat::new(
        Resolution::new(DEFAULT_VIDEO_WIDTH, DEFAULT_VIDEO_HEIGHT),
        FrameFormat::MJPEG,
        DEFAULT_VIDEO_FPS,
    );
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(target_format));

    let mut camera =
        Camera::new(CameraIndex::Index(device_index), requested).map_err(|e| classify_device_error(&e.to_string()))?;
    camera
        .open_stream()
        .map_err(|e| classify_device_error(&e.to_string()))?;

    let resolution = camera.resolution();
    let (width, height) = (resolution.width(), resolution.height());
    info!("CAMERA: Opened {}x{} @ {} fps", width, height, DEFAULT_VIDEO_FPS);

    let frame_interval = Duration::from_millis(1000 / DEFAULT_VIDEO_FPS as u64);
    let mut last_frame_time = Instant::now();
    let mut frame_count = 0u64;

    while ctx.is_running() {
        let elapsed = last_frame_time.elapsed();
        if elapsed < frame_interval {
            thread::sleep(frame_interval - elapsed);
        }
        last_frame_time = Instant::now();

        let buffer = match camera.frame() {
            Ok(b) => b,
            Err(e) => {
                warn!("CAMERA: Failed to capture frame: {e}");
                continue;
            }
        };

        let rgb = match buffer.decode_image::<RgbFormat>() {
            Ok(img) => img.into_raw(),
            Err(e) => {
                warn!("CAMERA: Failed to decode frame: {e}");
                continue;
            }
        };

        ctx.publish(Frame::new(width, height, rgb));
        frame_count += 1;
        if frame_count == 1 {
            info!("CAMERA: First frame received");
        }
    }

    if let Err(e) = camera.stop_stream() {
        debug!("CAMERA: stop_stream failed: {e}");
    }
    info!("Camera capture loop ended after {} frames", frame_count);
    Ok(())
}
