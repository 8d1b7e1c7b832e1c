//! Renders a raw frame through a filter into an encoded still.
//!
//! Colour operations use the Filter Effects colour matrices, applied in the
//! order the filter lists them and clamped after each step.

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, RgbImage};
use tracing::{debug, warn};

use crate::error::{BoothError, BoothResult};
use crate::filters::{FilterOp, FilterSpec};
use crate::frame::{Frame, FrameSource};

type Matrix = [[f32; 3]; 3];

/// One captured still plus the look it was rendered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedShot {
    /// JPEG bytes
    pub image_data: Vec<u8>,
    pub filter_name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct FrameCompositor {
    quality: u8,
}

impl Default for FrameCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCompositor {
    /// Encoder quality used for captured stills.
    pub const DEFAULT_QUALITY: u8 = 92;

    pub fn new() -> Self {
        Self {
            quality: Self::DEFAULT_QUALITY,
        }
    }

    /// Grab the source's current frame and render it.
    ///
    /// Fails with [`BoothError::NoFrameAvailable`] when the device is not
    /// ready; callers skip the shot instead of emitting a blank image.
    pub fn capture(&self, source: &mut dyn FrameSource, filter: &FilterSpec) -> BoothResult<CapturedShot> {
        if !source.is_ready() {
            return Err(BoothError::NoFrameAvailable);
        }

        let frame = source.current_frame().ok_or(BoothError::NoFrameAvailable)?;
        if frame.width == 0 || frame.height == 0 {
            warn!("Capture device reported an empty frame");
            return Err(BoothError::NoFrameAvailable);
        }

        self.render(&frame, filter)
    }

    /// Render a frame through `filter` and encode it.
    pub fn render(&self, frame: &Frame, filter: &FilterSpec) -> BoothResult<CapturedShot> {
        let mut image = frame.to_image()?;
        apply_filter(&mut image, filter.ops);

        let mut image_data = Vec::new();
        JpegEncoder::new_with_quality(&mut image_data, self.quality).encode_image(&image)?;

        debug!(
            "Rendered {}x{} frame with '{}' ({} bytes)",
            frame.width,
            frame.height,
            filter.name,
            image_data.len()
        );

        Ok(CapturedShot {
            image_data,
            filter_name: filter.name.to_string(),
            width: frame.width,
            height: frame.height,
        })
    }
}

/// Apply each operation of a filter to the image in place.
pub fn apply_filter(image: &mut RgbImage, ops: &[FilterOp]) {
    for op in ops {
        match *op {
            FilterOp::Blur(radius) => {
                if radius > 0.0 {
                    *image = imageops::blur(&*image, radius);
                }
            }
            FilterOp::Brightness(amount) => map_pixels(image, |c| c.map(|v| v * amount)),
            FilterOp::Contrast(amount) => map_pixels(image, |c| c.map(|v| (v - 0.5) * amount + 0.5)),
            other => {
                if let Some(matrix) = color_matrix(other) {
                    map_pixels(image, |c| multiply(&matrix, c));
                }
            }
        }
    }
}

fn map_pixels(image: &mut RgbImage, f: impl Fn([f32; 3]) -> [f32; 3]) {
    for pixel in image.pixels_mut() {
        let rgb = pixel.0.map(|v| v as f32 / 255.0);
        let out = f(rgb);
        pixel.0 = out.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8);
    }
}

fn multiply(m: &Matrix, c: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * c[0] + m[0][1] * c[1] + m[0][2] * c[2],
        m[1][0] * c[0] + m[1][1] * c[1] + m[1][2] * c[2],
        m[2][0] * c[0] + m[2][1] * c[1] + m[2][2] * c[2],
    ]
}

fn color_matrix(op: FilterOp) -> Option<Matrix> {
    let matrix = match op {
        FilterOp::Grayscale(amount) => {
            let a = 1.0 - amount.clamp(0.0, 1.0);
            [
                [0.2126 + 0.7874 * a, 0.7152 - 0.7152 * a, 0.0722 - 0.0722 * a],
                [0.2126 - 0.2126 * a, 0.7152 + 0.2848 * a, 0.0722 - 0.0722 * a],
                [0.2126 - 0.2126 * a, 0.7152 - 0.7152 * a, 0.0722 + 0.9278 * a],
            ]
        }
        FilterOp::Sepia(amount) => {
            let a = 1.0 - amount.clamp(0.0, 1.0);
            [
                [0.393 + 0.607 * a, 0.769 - 0.769 * a, 0.189 - 0.189 * a],
                [0.349 - 0.349 * a, 0.686 + 0.314 * a, 0.168 - 0.168 * a],
                [0.272 - 0.272 * a, 0.534 - 0.534 * a, 0.131 + 0.869 * a],
            ]
        }
        FilterOp::Saturate(s) => {
            let s = s.max(0.0);
            [
                [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
                [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
                [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
            ]
        }
        FilterOp::HueRotate(degrees) => {
            let (sin, cos) = degrees.to_radians().sin_cos();
            [
                [
                    0.213 + cos * 0.787 - sin * 0.213,
                    0.715 - cos * 0.715 - sin * 0.715,
                    0.072 - cos * 0.072 + sin * 0.928,
                ],
                [
                    0.213 - cos * 0.213 + sin * 0.143,
                    0.715 + cos * 0.285 + sin * 0.140,
                    0.072 - cos * 0.072 - sin * 0.283,
                ],
                [
                    0.213 - cos * 0.213 - sin * 0.787,
                    0.715 - cos * 0.715 + sin * 0.715,
                    0.072 + cos * 0.928 + sin * 0.072,
                ],
            ]
        }
        FilterOp::Brightness(_) | FilterOp::Contrast(_) | FilterOp::Blur(_) => return None,
    };
    Some(matrix)
}
