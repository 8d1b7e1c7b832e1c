//! Composes a finished session into a single downloadable strip.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use chrono::NaiveDate;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use tracing::{info, warn};

use crate::compositor::CapturedShot;
use crate::error::{BoothError, BoothResult};

/// File name offered for the downloaded strip
pub const STRIP_FILENAME: &str = "StudioStrip.jpg";
pub const STRIP_MIME: &str = "image/jpeg";
pub const CAPTION_PREFIX: &str = "Studio Memories";

/// DejaVu Sans, see `assets/DejaVuSans.LICENSE`
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

const PAPER: Rgb<u8> = Rgb([255, 253, 247]);
const INK: Rgb<u8> = Rgb([51, 51, 51]);

/// Encoded strip, ready to be offered as a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripArtifact {
    pub filename: &'static str,
    pub mime: &'static str,
    pub data: Vec<u8>,
    pub caption: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone)]
pub struct StripExporter {
    font: Option<FontArc>,
    shot_width: u32,
    margin: u32,
    caption_height: u32,
    quality: u8,
}

impl Default for StripExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StripExporter {
    /// Exporter captioning with the bundled font.
    pub fn new() -> Self {
        let font = match FontArc::try_from_slice(BUNDLED_FONT) {
            Ok(font) => Some(font),
            Err(e) => {
                warn!("Bundled caption font unusable: {e}");
                None
            }
        };
        Self {
            font,
            shot_width: 480,
            margin: 24,
            caption_height: 64,
            quality: 92,
        }
    }

    /// Render captions with `font` instead of the bundled one.
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    pub fn load_font(path: &Path) -> BoothResult<FontArc> {
        let bytes = std::fs::read(path).map_err(|e| BoothError::Strip(format!("{}: {e}", path.display())))?;
        FontArc::try_from_vec(bytes).map_err(|e| BoothError::Strip(format!("{}: {e}", path.display())))
    }

    /// `Studio Memories • 5 March 2024`
    pub fn caption(date: NaiveDate) -> String {
        format!("{CAPTION_PREFIX} • {}", date.format("%-d %B %Y"))
    }

    /// Stack `shots` top to bottom above a dated caption.
    pub fn export(&self, shots: &[CapturedShot], date: NaiveDate) -> BoothResult<StripArtifact> {
        if shots.is_empty() {
            return Err(BoothError::Strip("no shots to export".into()));
        }

        let mut frames = Vec::with_capacity(shots.len());
        for shot in shots {
            let image = image::load_from_memory(&shot.image_data)
                .map_err(|e| BoothError::Strip(e.to_string()))?
                .to_rgb8();
            let height = ((image.height() as f64 * self.shot_width as f64) / image.width() as f64)
                .round()
                .max(1.0) as u32;
            frames.push(imageops::resize(&image, self.shot_width, height, FilterType::Triangle));
        }

        let width = self.shot_width + 2 * self.margin;
        let height = self.margin
            + frames.iter().map(|f| f.height() + self.margin).sum::<u32>()
            + self.caption_height;
        let mut canvas = RgbImage::from_pixel(width, height, PAPER);

        let mut y = self.margin;
        for frame in &frames {
            imageops::overlay(&mut canvas, frame, self.margin as i64, y as i64);
            y += frame.height() + self.margin;
        }

        let caption = Self::caption(date);
        match &self.font {
            Some(font) => {
                let scale = PxScale::from(self.caption_height as f32 * 0.45);
                let (text_w, text_h) = text_size(scale, font, &caption);
                let x = width.saturating_sub(text_w) / 2;
                let text_y = y + self.caption_height.saturating_sub(text_h) / 2;
                draw_text_mut(&mut canvas, INK, x as i32, text_y as i32, scale, font, &caption);
            }
            None => warn!("No caption font available, leaving caption band blank"),
        }

        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, self.quality).encode_image(&canvas)?;

        info!("Exported {}x{} strip with {} shots ({} bytes)", width, height, frames.len(), data.len());
        Ok(StripArtifact {
            filename: STRIP_FILENAME,
            mime: STRIP_MIME,
            data,
            caption,
            width,
            height,
        })
    }
}
