//! Watershed candidate detection for touching objects
//!
//! Otsu-thresholds the inverted frame, seeds markers from the peaks of the
//! distance transform, and grows basins outward in order of decreasing
//! distance, restricted to the thresholded foreground. Each basin whose area
//! is in bounds becomes a candidate region; touching objects fall into
//! separate basins because each keeps its own distance peak.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::euclidean_squared_distance_transform;
use imageproc::point::Point;
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::BinaryHeap;
use tracing::debug;

use crate::config::DetectionConfig;
use crate::filters;

use super::types::{contour_area, Region, StrategyKind};
use super::DetectionStrategy;

/// Smoothing applied before thresholding
const PRE_BLUR_SIGMA: f32 = 1.0;

/// Marker-controlled watershed strategy
pub struct WatershedStrategy;

impl DetectionStrategy for WatershedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Watershed
    }

    fn detect(&self, gray: &GrayImage, config: &DetectionConfig) -> Vec<Region> {
        let (width, height) = gray.dimensions();
        if width < 3 || height < 3 {
            return Vec::new();
        }

        let smoothed = filters::gaussian_blur(gray, PRE_BLUR_SIGMA);

        // Otsu on the inverted frame: objects darker than the background
        // become foreground
        let mut inverted = smoothed;
        for pixel in inverted.pixels_mut() {
            pixel.0[0] = 255 - pixel.0[0];
        }
        let otsu = imageproc::contrast::otsu_level(&inverted);

        let mut foreground = GrayImage::new(width, height);
        let mut background = GrayImage::new(width, height);
        let mut fg_count = 0u64;
        for y in 0..height {
            for x in 0..width {
                if inverted.get_pixel(x, y).0[0] > otsu {
                    foreground.put_pixel(x, y, Luma([255]));
                    fg_count += 1;
                } else {
                    background.put_pixel(x, y, Luma([255]));
                }
            }
        }

        if fg_count == 0 || fg_count == width as u64 * height as u64 {
            return Vec::new();
        }

        // Distance of every pixel to the nearest background pixel
        let squared = euclidean_squared_distance_transform(&background);
        let mut distance = vec![0.0f64; (width * height) as usize];
        let mut max_distance = 0.0f64;
        for y in 0..height {
            for x in 0..width {
                let d = squared.get_pixel(x, y).0[0].sqrt();
                distance[(y * width + x) as usize] = d;
                if d > max_distance {
                    max_distance = d;
                }
            }
        }

        if max_distance <= 0.0 {
            return Vec::new();
        }

        // Seed markers from distance peaks
        let seed_threshold = config.watershed_seed_fraction * max_distance;
        let mut seeds = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                if distance[(y * width + x) as usize] >= seed_threshold {
                    seeds.put_pixel(x, y, Luma([255]));
                }
            }
        }

        let markers = connected_components(&seeds, Connectivity::Eight, Luma([0u8]));
        let labels = flood_basins(&markers, &foreground, &distance, width, height);

        let regions = extract_basins(&labels, width, height, config);
        debug!(count = regions.len(), "watershed strategy: accepted regions");
        regions
    }
}

/// Grow marker labels over the foreground in order of decreasing distance.
/// Deterministic: ties are resolved by insertion order.
fn flood_basins(
    markers: &image::ImageBuffer<Luma<u32>, Vec<u32>>,
    foreground: &GrayImage,
    distance: &[f64],
    width: u32,
    height: u32,
) -> Vec<u32> {
    let mut labels = vec![0u32; (width * height) as usize];

    // Max-heap keyed on scaled distance; earlier pushes win ties
    let mut heap: BinaryHeap<(i64, std::cmp::Reverse<u64>, u32, u32)> = BinaryHeap::new();
    let mut seq = 0u64;

    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) as usize;
            let label = markers.get_pixel(x, y).0[0];
            if label > 0 && foreground.get_pixel(x, y).0[0] > 0 {
                labels[idx] = label;
                heap.push(((distance[idx] * 1024.0) as i64, std::cmp::Reverse(seq), x, y));
                seq += 1;
            }
        }
    }

    while let Some((_, _, x, y)) = heap.pop() {
        let label = labels[(y * width + x) as usize];

        let neighbors = [
            (x.wrapping_sub(1), y),
            (x + 1, y),
            (x, y.wrapping_sub(1)),
            (x, y + 1),
        ];
        for (nx, ny) in neighbors {
            if nx >= width || ny >= height {
                continue;
            }
            let nidx = (ny * width + nx) as usize;
            if labels[nidx] != 0 || foreground.get_pixel(nx, ny).0[0] == 0 {
                continue;
            }
            labels[nidx] = label;
            heap.push(((distance[nidx] * 1024.0) as i64, std::cmp::Reverse(seq), nx, ny));
            seq += 1;
        }
    }

    labels
}

/// Turn each labelled basin into a region via its outer contour
fn extract_basins(
    labels: &[u32],
    width: u32,
    height: u32,
    config: &DetectionConfig,
) -> Vec<Region> {
    let max_label = labels.iter().copied().max().unwrap_or(0);
    if max_label == 0 {
        return Vec::new();
    }

    // Bounding box per label
    let mut bounds: Vec<Option<(u32, u32, u32, u32)>> = vec![None; (max_label + 1) as usize];
    for y in 0..height {
        for x in 0..width {
            let label = labels[(y * width + x) as usize];
            if label == 0 {
                continue;
            }
            let entry = &mut bounds[label as usize];
            match entry {
                None => *entry = Some((x, y, x, y)),
                Some((min_x, min_y, max_x, max_y)) => {
                    *min_x = (*min_x).min(x);
                    *min_y = (*min_y).min(y);
                    *max_x = (*max_x).max(x);
                    *max_y = (*max_y).max(y);
                }
            }
        }
    }

    let image_area = width as f64 * height as f64;
    let min_area = config.min_area_ratio * image_area;
    let max_area = config.max_area_ratio * image_area;

    let mut regions = Vec::new();
    for label in 1..=max_label {
        let Some((min_x, min_y, max_x, max_y)) = bounds[label as usize] else {
            continue;
        };

        // Basin mask with a 1px margin so border pixels trace cleanly
        let bw = max_x - min_x + 1;
        let bh = max_y - min_y + 1;
        let mut mask = GrayImage::new(bw + 2, bh + 2);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                if labels[(y * width + x) as usize] == label {
                    mask.put_pixel(x - min_x + 1, y - min_y + 1, Luma([255]));
                }
            }
        }

        let outline = find_contours::<i32>(&mask)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .max_by(|a, b| {
                contour_area(&a.points)
                    .partial_cmp(&contour_area(&b.points))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|c| {
                c.points
                    .into_iter()
                    .map(|p| Point::new(p.x - 1 + min_x as i32, p.y - 1 + min_y as i32))
                    .collect::<Vec<_>>()
            });

        let Some(outline) = outline else { continue };
        let Some(region) = Region::from_outline(outline, StrategyKind::Watershed) else {
            continue;
        };

        if region.area < min_area || region.area > max_area {
            continue;
        }

        regions.push(region);
    }

    regions
}

// ============================================================
// Tests
// ============================================================
