//! Contour-based candidate detection
//!
//! Binarizes the frame with two independent masks and keeps only pixels that
//! pass both: a global "differs from the background median by a margin" test
//! and a local "distinct from its neighbourhood" test. External contours of
//! the combined mask become candidate regions, gated by area, bounding-box
//! size, circularity, and aspect ratio.
//!
//! The background polarity is detected from the median brightness: on a light
//! background the working copy is inverted, so dark objects on white and
//! bright objects on dark are handled by the same mask logic.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::open;
use tracing::debug;

use crate::config::DetectionConfig;
use crate::filters;

use super::types::{Region, StrategyKind};
use super::DetectionStrategy;

/// Bilateral smoothing parameters for noise reduction before binarization
const SMOOTH_RADIUS: u32 = 2;
const SMOOTH_SIGMA_COLOR: f64 = 50.0;
const SMOOTH_SIGMA_SPACE: f64 = 2.0;

/// Contour segmentation strategy
pub struct ContourStrategy;

impl DetectionStrategy for ContourStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Contour
    }

    fn detect(&self, gray: &GrayImage, config: &DetectionConfig) -> Vec<Region> {
        let (width, height) = gray.dimensions();
        if width < 3 || height < 3 {
            return Vec::new();
        }

        // Noise reduction that keeps object boundaries intact
        let smoothed = filters::bilateral_filter(
            gray,
            SMOOTH_RADIUS,
            SMOOTH_SIGMA_COLOR,
            SMOOTH_SIGMA_SPACE,
        );

        // Work on a copy where objects are brighter than the background
        let background = median_brightness(&smoothed);
        let working = if background > 127 {
            invert(&smoothed)
        } else {
            smoothed
        };
        let background = median_brightness(&working);

        let mask = binarize(&working, background, config);
        let opened = open(&mask, Norm::LInf, 1);

        let image_area = width as f64 * height as f64;
        let min_area = config.min_area_ratio * image_area;
        let max_area = config.max_area_ratio * image_area;

        let contours = find_contours::<i32>(&opened);
        debug!(count = contours.len(), "contour strategy: raw contours");

        let mut regions = Vec::new();
        for contour in contours {
            if contour.border_type != BorderType::Outer {
                continue;
            }

            let Some(region) = Region::from_outline(contour.points, StrategyKind::Contour) else {
                continue;
            };

            if region.area < min_area || region.area > max_area {
                continue;
            }
            if region.width < config.min_object_px || region.height < config.min_object_px {
                continue;
            }
            if region.circularity < config.min_circularity {
                continue;
            }
            if region.aspect_ratio > config.max_aspect_ratio {
                continue;
            }

            regions.push(region);
        }

        debug!(count = regions.len(), "contour strategy: accepted regions");
        regions
    }
}

/// Median brightness over the full frame (histogram midpoint)
fn median_brightness(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total: u64 = gray.width() as u64 * gray.height() as u64;
    if total == 0 {
        return 128;
    }

    let median_pos = total / 2;
    let mut cumulative = 0u64;
    for (value, &count) in histogram.iter().enumerate() {
        cumulative += count;
        if cumulative >= median_pos {
            return value as u8;
        }
    }

    128
}

fn invert(gray: &GrayImage) -> GrayImage {
    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
        pixel.0[0] = 255 - pixel.0[0];
    }
    out
}

/// Intersection of the global-brightness mask and the local-adaptive mask
fn binarize(working: &GrayImage, background: u8, config: &DetectionConfig) -> GrayImage {
    let (width, height) = working.dimensions();

    let global_threshold = background
        .saturating_add(config.brightness_offset)
        .max(config.brightness_floor);

    let local_means = filters::box_mean(working, config.adaptive_block_radius);

    let mut mask = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let v = working.get_pixel(x, y).0[0];
            let local_mean = local_means[(y * width + x) as usize];

            let globally_bright = v > global_threshold;
            let locally_distinct = v as f64 > local_mean + config.adaptive_offset as f64;

            if globally_bright && locally_distinct {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    mask
}

// ============================================================
// Tests
// ============================================================
