//! The fixed catalog of studio looks.

use crate::error::{BoothError, BoothResult};

/// One colour operation. Amounts use the same units as CSS filter functions:
/// `1.0` is identity for the multiplicative ops, `0.0` for the blending ops.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(tag = "op", content = "amount", rename_all = "snake_case")]
pub enum FilterOp {
    Grayscale(f32),
    Sepia(f32),
    Saturate(f32),
    /// Degrees
    HueRotate(f32),
    Brightness(f32),
    Contrast(f32),
    /// Gaussian radius in pixels
    Blur(f32),
}

/// A named look, rendered by applying `ops` in order.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FilterSpec {
    pub name: &'static str,
    pub ops: &'static [FilterOp],
}

const NINETIES: FilterSpec = FilterSpec {
    name: "90s",
    ops: &[
        FilterOp::Contrast(1.1),
        FilterOp::Sepia(0.3),
        FilterOp::HueRotate(-10.0),
        FilterOp::Saturate(0.8),
        FilterOp::Brightness(1.1),
    ],
};

const TWO_THOUSANDS: FilterSpec = FilterSpec {
    name: "2000s",
    ops: &[
        FilterOp::Saturate(1.8),
        FilterOp::Contrast(1.05),
        FilterOp::Brightness(1.1),
        FilterOp::Sepia(0.1),
        FilterOp::HueRotate(10.0),
    ],
};

const NOIR: FilterSpec = FilterSpec {
    name: "Noir",
    ops: &[FilterOp::Grayscale(1.0), FilterOp::Contrast(0.8), FilterOp::Brightness(1.1)],
};

// Lens distortion is a preview-only effect; the still only gets the exposure lift.
const FISHEYE: FilterSpec = FilterSpec {
    name: "Fisheye",
    ops: &[FilterOp::Brightness(1.1)],
};

const RAINBOW: FilterSpec = FilterSpec {
    name: "Rainbow",
    ops: &[FilterOp::HueRotate(90.0)],
};

const GLITCH: FilterSpec = FilterSpec {
    name: "Glitch",
    ops: &[FilterOp::Contrast(1.5), FilterOp::Saturate(2.0)],
};

const CROSSHATCH: FilterSpec = FilterSpec {
    name: "Crosshatch",
    ops: &[FilterOp::Grayscale(0.5), FilterOp::Blur(1.0)],
};

static CATALOG: [FilterSpec; 7] = [NINETIES, TWO_THOUSANDS, NOIR, FISHEYE, RAINBOW, GLITCH, CROSSHATCH];

/// Ordered set of the seven studio filters. Order is display order only.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterCatalog;

impl FilterCatalog {
    pub fn new() -> Self {
        Self
    }

    pub fn all(&self) -> &'static [FilterSpec] {
        &CATALOG
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        CATALOG.iter().map(|f| f.name)
    }

    /// The look selected when a studio opens
    pub fn default_filter(&self) -> &'static FilterSpec {
        &CATALOG[0]
    }

    /// Look up a filter by name, ignoring case.
    pub fn resolve(&self, name: &str) -> BoothResult<&'static FilterSpec> {
        CATALOG
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| BoothError::UnknownFilter(name.to_string()))
    }
}
