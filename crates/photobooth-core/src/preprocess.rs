//! Downscale and re-encode stills before they leave the booth.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tracing::{debug, warn};

use crate::error::{BoothError, BoothResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePreprocessor {
    pub max_width: u32,
    pub quality: u8,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self {
            max_width: Self::DEFAULT_MAX_WIDTH,
            quality: Self::DEFAULT_QUALITY,
        }
    }
}

impl ImagePreprocessor {
    pub const DEFAULT_MAX_WIDTH: u32 = 800;
    pub const DEFAULT_QUALITY: u8 = 80;

    pub fn new(max_width: u32, quality: u8) -> Self {
        Self { max_width, quality }
    }

    /// Bound `image_data` to `max_width`. Never fails: on any decode or
    /// encode error the original bytes are returned.
    pub fn resize(&self, image_data: &[u8]) -> Vec<u8> {
        match resize(image_data, self.max_width, self.quality) {
            Ok(out) => out,
            Err(e) => {
                warn!("Preprocessing failed, sending original image: {e}");
                image_data.to_vec()
            }
        }
    }
}

/// Scale a JPEG down to `max_width`, preserving aspect ratio.
///
/// Images already within bounds are returned byte-for-byte.
pub fn resize(image_data: &[u8], max_width: u32, quality: u8) -> BoothResult<Vec<u8>> {
    let image = image::load_from_memory(image_data).map_err(|e| BoothError::Preprocess(e.to_string()))?;
    let (width, height) = (image.width(), image.height());

    if max_width == 0 || width <= max_width {
        return Ok(image_data.to_vec());
    }

    let scaled_height = ((height as f64 * max_width as f64) / width as f64).round().max(1.0) as u32;
    let scaled = image
        .resize_exact(max_width, scaled_height, FilterType::Triangle)
        .to_rgb8();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(&scaled)
        .map_err(|e| BoothError::Preprocess(e.to_string()))?;

    debug!(
        "Resized {}x{} -> {}x{} ({} -> {} bytes)",
        width,
        height,
        max_width,
        scaled_height,
        image_data.len(),
        out.len()
    );
    Ok(out)
}
