//! Circular-blob candidate detection
//!
//! Hough-gradient circle transform tuned for small, nearly circular objects.
//! Canny edge pixels vote along their gradient direction for circle centers
//! across the configured radius range; accumulator peaks become candidate
//! centers, and the radius is read off the mode of edge-pixel distances.
//!
//! Detected circles are reported with ideal shape descriptors (circularity
//! and aspect ratio of exactly 1.0), as the transform only ever proposes
//! circles.

use image::GrayImage;
use imageproc::edges::canny;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use imageproc::point::Point;
use tracing::debug;

use crate::config::DetectionConfig;
use crate::filters;

use super::types::{Region, StrategyKind};
use super::DetectionStrategy;

/// Smoothing applied before edge extraction
const PRE_BLUR_SIGMA: f32 = 1.0;

/// Points used to synthesize the outline polygon of a detected circle
const OUTLINE_POINTS: usize = 32;

/// Circular Hough transform strategy
pub struct BlobStrategy;

impl DetectionStrategy for BlobStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Blob
    }

    fn detect(&self, gray: &GrayImage, config: &DetectionConfig) -> Vec<Region> {
        let (width, height) = gray.dimensions();
        if width < 3 || height < 3 {
            return Vec::new();
        }

        let blurred = filters::gaussian_blur(gray, PRE_BLUR_SIGMA);
        let edges = canny(&blurred, config.blob_canny_low, config.blob_canny_high);
        let gx = horizontal_sobel(&blurred);
        let gy = vertical_sobel(&blurred);

        // Edge pixels with usable gradient direction
        let mut edge_points: Vec<(u32, u32, f64, f64)> = Vec::new();
        for y in 0..height {
            for x in 0..width {
                if edges.get_pixel(x, y).0[0] == 0 {
                    continue;
                }
                let dx = gx.get_pixel(x, y).0[0] as f64;
                let dy = gy.get_pixel(x, y).0[0] as f64;
                let magnitude = (dx * dx + dy * dy).sqrt();
                if magnitude < 1e-3 {
                    continue;
                }
                edge_points.push((x, y, dx / magnitude, dy / magnitude));
            }
        }

        if edge_points.is_empty() {
            return Vec::new();
        }

        // Vote for centers along the gradient line, both directions
        let mut accumulator = vec![0u32; (width * height) as usize];
        for &(x, y, ux, uy) in &edge_points {
            for r in config.blob_min_radius..=config.blob_max_radius {
                for sign in [1.0f64, -1.0] {
                    let cx = (x as f64 + sign * r as f64 * ux).round() as i64;
                    let cy = (y as f64 + sign * r as f64 * uy).round() as i64;
                    if cx >= 0 && cy >= 0 && (cx as u32) < width && (cy as u32) < height {
                        accumulator[(cy as u32 * width + cx as u32) as usize] += 1;
                    }
                }
            }
        }

        let centers = find_centers(&accumulator, width, height, config);
        debug!(count = centers.len(), "blob strategy: candidate centers");

        let mut regions = Vec::new();
        for (cx, cy) in centers {
            let Some(radius) = estimate_radius(&edge_points, cx, cy, config) else {
                continue;
            };

            let r = radius as i64;
            let x0 = (cx as i64 - r).max(0) as u32;
            let y0 = (cy as i64 - r).max(0) as u32;
            let x1 = (cx as i64 + r).min(width as i64 - 1) as u32;
            let y1 = (cy as i64 + r).min(height as i64 - 1) as u32;
            let box_w = x1 - x0 + 1;
            let box_h = y1 - y0 + 1;

            if box_w < config.min_object_px || box_h < config.min_object_px {
                continue;
            }

            let radius_f = radius as f64;
            regions.push(Region {
                x: x0,
                y: y0,
                width: box_w,
                height: box_h,
                outline: circle_outline(cx, cy, radius),
                area: std::f64::consts::PI * radius_f * radius_f,
                perimeter: 2.0 * std::f64::consts::PI * radius_f,
                circularity: 1.0,
                aspect_ratio: 1.0,
                strategy: StrategyKind::Blob,
            });
        }

        debug!(count = regions.len(), "blob strategy: accepted regions");
        regions
    }
}

/// Accumulator peaks above the vote threshold, separated by the minimum
/// center distance. Deterministic: sorted by votes, then scan order.
fn find_centers(
    accumulator: &[u32],
    width: u32,
    height: u32,
    config: &DetectionConfig,
) -> Vec<(u32, u32)> {
    let mut candidates: Vec<(u32, u32, u32)> = Vec::new();

    for y in 0..height {
        for x in 0..width {
            // 3x3 neighbourhood sum absorbs discretization spread
            let mut votes = 0u32;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let sx = x as i64 + dx;
                    let sy = y as i64 + dy;
                    if sx >= 0 && sy >= 0 && (sx as u32) < width && (sy as u32) < height {
                        votes += accumulator[(sy as u32 * width + sx as u32) as usize];
                    }
                }
            }
            if votes as f32 >= config.blob_accumulator_threshold {
                candidates.push((votes, x, y));
            }
        }
    }

    candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.2.cmp(&b.2)).then(a.1.cmp(&b.1)));

    let min_dist_sq = (config.blob_min_distance * config.blob_min_distance) as i64;
    let mut accepted: Vec<(u32, u32)> = Vec::new();
    for (_votes, x, y) in candidates {
        let far_enough = accepted.iter().all(|&(ax, ay)| {
            let dx = ax as i64 - x as i64;
            let dy = ay as i64 - y as i64;
            dx * dx + dy * dy >= min_dist_sq
        });
        if far_enough {
            accepted.push((x, y));
        }
    }

    accepted
}

/// Mode of edge-pixel distances from the center, within the radius bounds.
/// Returns None when too few edge pixels support any radius.
fn estimate_radius(
    edge_points: &[(u32, u32, f64, f64)],
    cx: u32,
    cy: u32,
    config: &DetectionConfig,
) -> Option<u32> {
    let max_r = config.blob_max_radius as usize;
    let mut histogram = vec![0u32; max_r + 2];

    for &(x, y, _, _) in edge_points {
        let dx = x as f64 - cx as f64;
        let dy = y as f64 - cy as f64;
        let distance = (dx * dx + dy * dy).sqrt().round() as usize;
        if distance >= config.blob_min_radius as usize && distance <= max_r {
            histogram[distance] += 1;
        }
    }

    let (best_r, best_count) = histogram
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))?;

    // A circle of radius r should contribute on the order of 2πr edge
    // pixels; require at least a quarter of that
    let expected = (std::f64::consts::PI * best_r as f64 / 2.0).max(4.0);
    if (*best_count as f64) < expected {
        return None;
    }

    Some(best_r as u32)
}

/// Polygonal outline of a circle, for rendering and shape analysis
fn circle_outline(cx: u32, cy: u32, radius: u32) -> Vec<Point<i32>> {
    (0..OUTLINE_POINTS)
        .map(|i| {
            let angle = 2.0 * std::f64::consts::PI * i as f64 / OUTLINE_POINTS as f64;
            Point::new(
                (cx as f64 + radius as f64 * angle.cos()).round() as i32,
                (cy as f64 + radius as f64 * angle.sin()).round() as i32,
            )
        })
        .collect()
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn white_with_black_disc(size: u32, cx: i32, cy: i32, radius: i32) -> GrayImage {
        let mut gray = GrayImage::from_pixel(size, size, Luma([255]));
        for y in 0..size as i32 {
            for x in 0..size as i32 {
                let dx = x - cx;
                let dy = y - cy;
                if dx * dx + dy * dy <= radius * radius {
                    gray.put_pixel(x as u32, y as u32, Luma([0]));
                }
            }
        }
        gray
    }

    #[test]
    fn test_blank_image_yields_no_regions() {
        let gray = GrayImage::from_pixel(100, 100, Luma([128]));
        let regions = BlobStrategy.detect(&gray, &DetectionConfig::default());
        assert!(regions.is_empty());
    }

    #[test]
    fn test_degenerate_image_yields_no_regions() {
        let gray = GrayImage::new(1, 1);
        let regions = BlobStrategy.detect(&gray, &DetectionConfig::default());
        assert!(regions.is_empty());
    }

    #[test]
    fn test_detects_disc() {
        let gray = white_with_black_disc(120, 60, 60, 20);
        let regions = BlobStrategy.detect(&gray, &DetectionConfig::default());

        assert!(!regions.is_empty(), "disc should produce a circle");
        let region = &regions[0];
        assert_eq!(region.strategy, StrategyKind::Blob);
        assert_eq!(region.circularity, 1.0);
        assert_eq!(region.aspect_ratio, 1.0);

        let (cx, cy) = region.center();
        assert!((cx - 60.0).abs() <= 4.0, "center x off: {}", cx);
        assert!((cy - 60.0).abs() <= 4.0, "center y off: {}", cy);

        // Radius within a couple of pixels of the truth
        let radius = region.width.max(region.height) as f64 / 2.0;
        assert!((radius - 20.0).abs() <= 4.0, "radius off: {}", radius);
    }

    #[test]
    fn test_detects_two_separated_discs() {
        let mut gray = white_with_black_disc(200, 50, 50, 15);
        for y in 0..200i32 {
            for x in 0..200i32 {
                let dx = x - 150;
                let dy = y - 150;
                if dx * dx + dy * dy <= 15 * 15 {
                    gray.put_pixel(x as u32, y as u32, Luma([0]));
                }
            }
        }

        let regions = BlobStrategy.detect(&gray, &DetectionConfig::default());
        assert!(regions.len() >= 2, "both discs should be found");
    }

    #[test]
    fn test_min_distance_suppression() {
        let gray = white_with_black_disc(120, 60, 60, 20);
        let regions = BlobStrategy.detect(&gray, &DetectionConfig::default());

        // A single disc must not spawn a cluster of near-identical circles
        for (i, a) in regions.iter().enumerate() {
            for b in regions.iter().skip(i + 1) {
                let (ax, ay) = a.center();
                let (bx, by) = b.center();
                let dist = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();
                assert!(dist >= 20.0 - 1e-9);
            }
        }
    }

    #[test]
    fn test_circle_outline_closed_ring() {
        let outline = circle_outline(50, 50, 10);
        assert_eq!(outline.len(), OUTLINE_POINTS);
        for p in &outline {
            let dx = p.x as f64 - 50.0;
            let dy = p.y as f64 - 50.0;
            let r = (dx * dx + dy * dy).sqrt();
            assert!((r - 10.0).abs() < 1.0);
        }
    }

    #[test]
    fn test_estimate_radius_rejects_sparse_support() {
        // Three stray edge pixels cannot support a circle
        let edge_points = vec![
            (10u32, 10u32, 1.0f64, 0.0f64),
            (30, 30, 0.0, 1.0),
            (50, 10, 1.0, 0.0),
        ];
        let radius = estimate_radius(&edge_points, 30, 20, &DetectionConfig::default());
        assert!(radius.is_none());
    }
}
