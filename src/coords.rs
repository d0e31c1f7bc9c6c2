//! Mapping between display (canvas) space and native image-pixel space.
//!
//! The image is fitted into the canvas with a single uniform scale and
//! centered, so at most one axis is letterboxed. Nothing is cropped.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ImagePoint, ImageSize};

#[derive(Debug, Error, PartialEq)]
pub enum CoordinateError {
    #[error("canvas size must be positive and finite (got {width}x{height})")]
    InvalidCanvas { width: f64, height: f64 },

    #[error("image size must be non-zero (got {width}x{height})")]
    InvalidImage { width: u32, height: u32 },

    #[error("point ({x}, {y}) is outside the displayed image")]
    OutsideImage { x: f64, y: f64 },
}

/// A pointer position in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayPoint {
    pub x: f64,
    pub y: f64,
}

impl DisplayPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Size of the canvas box the image is rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl CanvasSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Fit of one image into one canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    image: ImageSize,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl CoordinateMapper {
    pub fn new(canvas: CanvasSize, image: ImageSize) -> Result<Self, CoordinateError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(canvas.width) || !valid(canvas.height) {
            return Err(CoordinateError::InvalidCanvas {
                width: canvas.width,
                height: canvas.height,
            });
        }
        if image.width == 0 || image.height == 0 {
            return Err(CoordinateError::InvalidImage {
                width: image.width,
                height: image.height,
            });
        }

        let (iw, ih) = (image.width as f64, image.height as f64);
        let scale = (canvas.width / iw).min(canvas.height / ih);

        Ok(Self {
            image,
            scale,
            offset_x: (canvas.width - iw * scale) / 2.0,
            offset_y: (canvas.height - ih * scale) / 2.0,
        })
    }

    /// Display pixels per image pixel.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Top-left corner of the rendered image inside the canvas.
    pub fn offset(&self) -> DisplayPoint {
        DisplayPoint::new(self.offset_x, self.offset_y)
    }

    pub fn to_image(&self, point: DisplayPoint) -> Result<ImagePoint, CoordinateError> {
        let x = (point.x - self.offset_x) / self.scale;
        let y = (point.y - self.offset_y) / self.scale;

        // Half-open bounds: the far edge belongs to the letterbox.
        if x >= 0.0 && x < self.image.width as f64 && y >= 0.0 && y < self.image.height as f64 {
            Ok(ImagePoint::new(x, y))
        } else {
            Err(CoordinateError::OutsideImage {
                x: point.x,
                y: point.y,
            })
        }
    }

    pub fn to_display(&self, point: ImagePoint) -> DisplayPoint {
        DisplayPoint::new(
            point.x * self.scale + self.offset_x,
            point.y * self.scale + self.offset_y,
        )
    }
}

/// Convert a canvas position to native image space.
pub fn to_image_space(
    point: DisplayPoint,
    canvas: CanvasSize,
    image: ImageSize,
) -> Result<ImagePoint, CoordinateError> {
    CoordinateMapper::new(canvas, image)?.to_image(point)
}

/// Inverse of [`to_image_space`], used to place overlay markers.
pub fn to_display_space(
    point: ImagePoint,
    canvas: CanvasSize,
    image: ImageSize,
) -> Result<DisplayPoint, CoordinateError> {
    Ok(CoordinateMapper::new(canvas, image)?.to_display(point))
}
