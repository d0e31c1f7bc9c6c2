use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::session::ImageSize;

/// Errors building a [`Mask`] from raw parts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaskError {
    #[error("mask dimensions must be non-zero (got {width}x{height})")]
    EmptyDimensions { width: u32, height: u32 },

    #[error("mask has {actual} pixels, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("mask payload is not valid base64: {0}")]
    Encoding(String),
}

/// A per-pixel segmentation aligned to the session's native image size.
///
/// One byte per pixel in row-major order: `0` is background, any other value
/// is foreground (or an instance label). The `version` is the
/// [`PromptSnapshot`](super::PromptSnapshot) version that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    version: u64,
}

impl Mask {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>, version: u64) -> Result<Self, MaskError> {
        if width == 0 || height == 0 {
            return Err(MaskError::EmptyDimensions { width, height });
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(MaskError::LengthMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
            version,
        })
    }

    /// A mask where every pixel is `value`.
    pub fn filled(width: u32, height: u32, value: u8, version: u64) -> Result<Self, MaskError> {
        Self::new(width, height, vec![value; width as usize * height as usize], version)
    }

    /// Build a mask by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(
        width: u32,
        height: u32,
        version: u64,
        mut f: impl FnMut(u32, u32) -> bool,
    ) -> Result<Self, MaskError> {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(u8::from(f(x, y)));
            }
        }
        Self::new(width, height, pixels, version)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.pixels[self.index(x, y)] != 0
    }

    pub fn foreground_count(&self) -> usize {
        self.pixels.iter().filter(|&&p| p != 0).count()
    }

    pub(crate) fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// Quantitative measurements derived from a single [`Mask`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsResult {
    /// Foreground share of all pixels, in `[0, 100]`.
    pub area_fraction_percent: f64,
    /// Components at or above the noise threshold.
    pub object_count: usize,
    /// Foreground area per counted object, in physical units.
    pub mean_object_area: f64,
}

impl StatsResult {
    pub fn empty() -> Self {
        Self {
            area_fraction_percent: 0.0,
            object_count: 0,
            mean_object_area: 0.0,
        }
    }
}
