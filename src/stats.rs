//! Reduction of a mask into area and object statistics.
//!
//! Components are labelled with **8-connectivity**: pixels touching only at a
//! corner belong to the same object, so diagonally touching grains are not
//! split apart.

use thiserror::Error;

use crate::models::{Mask, StatsResult};

/// Components smaller than this many pixels are treated as noise.
pub const DEFAULT_MIN_OBJECT_PIXELS: usize = 10;

/// Physical area of one pixel when the image is uncalibrated.
pub const DEFAULT_PIXEL_AREA: f64 = 1.0;

const NEIGHBOURS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

#[derive(Debug, Error, PartialEq)]
pub enum StatsError {
    #[error("pixel area must be positive and finite (got {0})")]
    InvalidPixelArea(f64),
}

/// Accept `pixel_area` only if it keeps every reported area non-negative.
pub fn check_pixel_area(pixel_area: f64) -> Result<f64, StatsError> {
    if pixel_area.is_finite() && pixel_area > 0.0 {
        Ok(pixel_area)
    } else {
        Err(StatsError::InvalidPixelArea(pixel_area))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsReducer {
    min_object_pixels: usize,
    pixel_area: f64,
}

impl Default for StatsReducer {
    fn default() -> Self {
        Self {
            min_object_pixels: DEFAULT_MIN_OBJECT_PIXELS,
            pixel_area: DEFAULT_PIXEL_AREA,
        }
    }
}

impl StatsReducer {
    pub fn new(min_object_pixels: usize, pixel_area: f64) -> Result<Self, StatsError> {
        Self::default()
            .with_min_object_pixels(min_object_pixels)
            .with_pixel_area(pixel_area)
    }

    pub fn with_min_object_pixels(mut self, min_object_pixels: usize) -> Self {
        self.min_object_pixels = min_object_pixels;
        self
    }

    /// Physical area covered by one pixel (e.g. µm² per pixel).
    pub fn with_pixel_area(mut self, pixel_area: f64) -> Result<Self, StatsError> {
        self.pixel_area = check_pixel_area(pixel_area)?;
        Ok(self)
    }

    pub fn min_object_pixels(&self) -> usize {
        self.min_object_pixels
    }

    pub fn pixel_area(&self) -> f64 {
        self.pixel_area
    }

    pub fn compute(&self, mask: &Mask) -> StatsResult {
        let total = mask.pixels().len();
        let foreground = mask.foreground_count();

        let object_count = component_areas(mask)
            .into_iter()
            .filter(|&area| area >= self.min_object_pixels)
            .count();

        let mean_object_area = if object_count == 0 {
            0.0
        } else {
            foreground as f64 / object_count as f64 * self.pixel_area
        };

        StatsResult {
            area_fraction_percent: 100.0 * foreground as f64 / total as f64,
            object_count,
            mean_object_area,
        }
    }

    /// Areas of the counted objects in physical units, largest first.
    pub fn object_areas(&self, mask: &Mask) -> Vec<f64> {
        let mut areas: Vec<usize> = component_areas(mask)
            .into_iter()
            .filter(|&area| area >= self.min_object_pixels)
            .collect();
        areas.sort_unstable_by(|a, b| b.cmp(a));
        areas
            .into_iter()
            .map(|area| area as f64 * self.pixel_area)
            .collect()
    }
}

/// Pixel counts of every 8-connected foreground component, in scan order.
pub fn component_areas(mask: &Mask) -> Vec<usize> {
    let (width, height) = (mask.width() as i64, mask.height() as i64);
    let pixels = mask.pixels();
    let mut visited = vec![false; pixels.len()];
    let mut stack = Vec::new();
    let mut areas = Vec::new();

    for start in 0..pixels.len() {
        if pixels[start] == 0 || visited[start] {
            continue;
        }

        visited[start] = true;
        stack.push(start);
        let mut area = 0;

        while let Some(idx) = stack.pop() {
            area += 1;
            let (x, y) = ((idx as i64) % width, (idx as i64) / width);

            for (dx, dy) in NEIGHBOURS {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= width || ny >= height {
                    continue;
                }
                let n = (ny * width + nx) as usize;
                if pixels[n] != 0 && !visited[n] {
                    visited[n] = true;
                    stack.push(n);
                }
            }
        }

        areas.push(area);
    }

    areas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_rows(rows: &[&str]) -> Mask {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        Mask::from_fn(width, height, 1, |x, y| {
            rows[y as usize].as_bytes()[x as usize] == b'#'
        })
        .unwrap()
    }

    #[test]
    fn diagonal_neighbours_join_one_component() {
        let mask = mask_from_rows(&["#..", ".#.", "..#"]);
        assert_eq!(component_areas(&mask), vec![3]);
    }

    #[test]
    fn separated_blobs_are_distinct() {
        let mask = mask_from_rows(&["##..#", "##..#", ".....", "#...."]);
        let mut areas = component_areas(&mask);
        areas.sort_unstable();
        assert_eq!(areas, vec![1, 2, 4]);
    }

    #[test]
    fn rejects_pixel_areas_that_would_go_negative() {
        for bad in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            assert!(StatsReducer::new(1, bad).is_err(), "{} accepted", bad);
        }
        assert_eq!(StatsReducer::new(1, 0.5).unwrap().pixel_area(), 0.5);
    }

    #[test]
    fn empty_mask_has_no_components() {
        let mask = Mask::filled(4, 4, 0, 1).unwrap();
        assert!(component_areas(&mask).is_empty());
    }
}
