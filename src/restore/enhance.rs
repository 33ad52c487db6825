//! Post-restoration detail and contrast refinement
//!
//! Deconvolution output tends to carry ringing and flattened local contrast.
//! The enhancement chain is: edge-preserving bilateral smoothing, clip-limited
//! tile histogram equalization, and, when the result still has little gradient
//! energy, a blend of the Sobel edge map back into the image.
//!
//! Color ROIs are processed on their grayscale proxy; each color channel is
//! then remapped through a histogram-matching lookup table so it adopts the
//! proxy's intensity distribution while keeping channel-relative color.

use image::{GrayImage, Luma, RgbImage};
use tracing::debug;

use crate::config::EnhanceConfig;
use crate::filters;
use crate::metrics;

/// Detail enhancement processor
pub struct DetailEnhancer;

impl DetailEnhancer {
    /// Run the full enhancement chain on a grayscale ROI
    pub fn enhance(gray: &GrayImage, config: &EnhanceConfig) -> GrayImage {
        let (width, height) = gray.dimensions();
        if width < 3 || height < 3 {
            return gray.clone();
        }

        let smoothed = filters::bilateral_filter(
            gray,
            config.bilateral_radius,
            config.bilateral_sigma_color,
            config.bilateral_sigma_space,
        );

        let equalized = clahe(&smoothed, config.clahe_clip_limit, config.clahe_tiles);

        if metrics::tenengrad(&equalized) < config.edge_inject_threshold {
            debug!("low residual edge energy, injecting edge map");
            inject_edges(&equalized, config.edge_inject_base, config.edge_inject_amount)
        } else {
            equalized
        }
    }

    /// Remap each color channel so its distribution matches the reference
    /// (the enhanced grayscale proxy)
    pub fn match_channels(color: &RgbImage, reference: &GrayImage) -> RgbImage {
        let (width, height) = color.dimensions();
        if width == 0 || height == 0 || reference.width() == 0 || reference.height() == 0 {
            return color.clone();
        }

        let reference_hist = gray_histogram(reference);

        let mut out = color.clone();
        for channel in 0..3 {
            let mut channel_hist = [0u64; 256];
            for pixel in color.pixels() {
                channel_hist[pixel.0[channel] as usize] += 1;
            }

            let lut = matching_lut(&channel_hist, &reference_hist);
            for pixel in out.pixels_mut() {
                pixel.0[channel] = lut[pixel.0[channel] as usize];
            }
        }

        out
    }
}

/// Contrast-limited adaptive histogram equalization over a tile grid, with
/// bilinear interpolation between tile lookup tables
fn clahe(gray: &GrayImage, clip_limit: f64, tiles: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if tiles == 0 || width < tiles || height < tiles {
        return gray.clone();
    }

    let tiles = tiles as usize;
    let tile_w = (width as usize).div_ceil(tiles);
    let tile_h = (height as usize).div_ceil(tiles);

    // Per-tile clipped LUTs
    let mut luts = vec![[0u8; 256]; tiles * tiles];
    for ty in 0..tiles {
        for tx in 0..tiles {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = ((tx + 1) * tile_w).min(width as usize);
            let y1 = ((ty + 1) * tile_h).min(height as usize);
            if x0 >= x1 || y0 >= y1 {
                continue;
            }

            let mut histogram = [0.0f64; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    histogram[gray.get_pixel(x as u32, y as u32).0[0] as usize] += 1.0;
                }
            }

            let tile_pixels = ((x1 - x0) * (y1 - y0)) as f64;
            let clip = (clip_limit * tile_pixels / 256.0).max(1.0);

            // Clip and redistribute the excess uniformly
            let mut excess = 0.0f64;
            for bin in histogram.iter_mut() {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            let bonus = excess / 256.0;
            for bin in histogram.iter_mut() {
                *bin += bonus;
            }

            let lut = &mut luts[ty * tiles + tx];
            let mut cumulative = 0.0f64;
            for (value, bin) in histogram.iter().enumerate() {
                cumulative += bin;
                lut[value] = (cumulative / tile_pixels * 255.0).round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    // Bilinear interpolation between the four surrounding tile LUTs
    let mut out = GrayImage::new(width, height);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let v = gray.get_pixel(x as u32, y as u32).0[0] as usize;

            let fx = (x as f64 - tile_w as f64 / 2.0) / tile_w as f64;
            let fy = (y as f64 - tile_h as f64 / 2.0) / tile_h as f64;

            let tx0 = fx.floor().max(0.0) as usize;
            let ty0 = fy.floor().max(0.0) as usize;
            let tx0 = tx0.min(tiles - 1);
            let ty0 = ty0.min(tiles - 1);
            let tx1 = (tx0 + 1).min(tiles - 1);
            let ty1 = (ty0 + 1).min(tiles - 1);

            // Border pixels beyond the first tile center use that tile alone
            let wx = if fx < 0.0 { 0.0 } else { fx - fx.floor() };
            let wy = if fy < 0.0 { 0.0 } else { fy - fy.floor() };

            let top = luts[ty0 * tiles + tx0][v] as f64 * (1.0 - wx)
                + luts[ty0 * tiles + tx1][v] as f64 * wx;
            let bottom = luts[ty1 * tiles + tx0][v] as f64 * (1.0 - wx)
                + luts[ty1 * tiles + tx1][v] as f64 * wx;
            let value = top * (1.0 - wy) + bottom * wy;

            out.put_pixel(x as u32, y as u32, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }

    out
}

/// Blend a normalized Sobel magnitude map back into the image. A flat image
/// (zero edge map) is returned untouched.
fn inject_edges(gray: &GrayImage, base: f64, amount: f64) -> GrayImage {
    let (width, height) = gray.dimensions();

    let mut magnitude = vec![0.0f64; (width * height) as usize];
    let mut max_magnitude = 0.0f64;
    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let p = |dx: i32, dy: i32| -> f64 {
                gray.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32).0[0] as f64
            };
            let gx = p(1, -1) + 2.0 * p(1, 0) + p(1, 1) - p(-1, -1) - 2.0 * p(-1, 0) - p(-1, 1);
            let gy = p(-1, 1) + 2.0 * p(0, 1) + p(1, 1) - p(-1, -1) - 2.0 * p(0, -1) - p(1, -1);
            let m = (gx * gx + gy * gy).sqrt();
            magnitude[(y * width + x) as usize] = m;
            if m > max_magnitude {
                max_magnitude = m;
            }
        }
    }

    if max_magnitude <= 0.0 {
        return gray.clone();
    }

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let original = gray.get_pixel(x, y).0[0] as f64;
            let edge = magnitude[(y * width + x) as usize] / max_magnitude * 255.0;
            let value = base * original + amount * edge;
            out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }

    out
}

fn gray_histogram(gray: &GrayImage) -> [u64; 256] {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }
    histogram
}

/// Histogram-matching lookup table: maps each source intensity to the
/// reference intensity with the closest cumulative probability
fn matching_lut(source: &[u64; 256], reference: &[u64; 256]) -> [u8; 256] {
    let source_cdf = cdf(source);
    let reference_cdf = cdf(reference);

    let mut lut = [0u8; 256];
    for i in 0..256 {
        let mut best = 0usize;
        let mut best_diff = f64::MAX;
        for (j, &ref_value) in reference_cdf.iter().enumerate() {
            let diff = (source_cdf[i] - ref_value).abs();
            if diff < best_diff {
                best_diff = diff;
                best = j;
            }
        }
        lut[i] = best as u8;
    }

    lut
}

fn cdf(histogram: &[u64; 256]) -> [f64; 256] {
    let total: u64 = histogram.iter().sum();
    let total = total.max(1) as f64;

    let mut out = [0.0f64; 256];
    let mut cumulative = 0u64;
    for (i, &count) in histogram.iter().enumerate() {
        cumulative += count;
        out[i] = cumulative as f64 / total;
    }
    out
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_enhance_degenerate_roi_untouched() {
        let gray = GrayImage::from_pixel(2, 2, Luma([50]));
        let out = DetailEnhancer::enhance(&gray, &EnhanceConfig::default());
        assert_eq!(out, gray);
    }

    #[test]
    fn test_enhance_all_white_unchanged() {
        // Featureless white ROI must pass through with content intact:
        // bilateral and CLAHE are identities on it, and the edge injection
        // skips a zero edge map
        let gray = GrayImage::from_pixel(64, 64, Luma([255]));
        let out = DetailEnhancer::enhance(&gray, &EnhanceConfig::default());
        assert_eq!(out, gray);
    }

    #[test]
    fn test_clahe_maps_white_to_white() {
        let gray = GrayImage::from_pixel(32, 32, Luma([255]));
        let out = clahe(&gray, 2.0, 4);
        assert!(out.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn test_clahe_raises_local_contrast() {
        // Low-contrast ramp squeezed into [100, 140]
        let gray = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x * 40 / 64) as u8]));
        let out = clahe(&gray, 2.0, 4);

        let spread = |img: &GrayImage| {
            let (mut min, mut max) = (255u8, 0u8);
            for p in img.pixels() {
                min = min.min(p.0[0]);
                max = max.max(p.0[0]);
            }
            max as i32 - min as i32
        };

        assert!(spread(&out) > spread(&gray));
    }

    #[test]
    fn test_clahe_tiny_image_untouched() {
        let gray = GrayImage::from_pixel(3, 3, Luma([77]));
        let out = clahe(&gray, 2.0, 4);
        assert_eq!(out, gray);
    }

    #[test]
    fn test_inject_edges_skips_flat_image() {
        let gray = GrayImage::from_pixel(30, 30, Luma([200]));
        let out = inject_edges(&gray, 0.8, 0.2);
        assert_eq!(out, gray);
    }

    #[test]
    fn test_inject_edges_brightens_edges() {
        let mut gray = GrayImage::from_pixel(40, 40, Luma([100]));
        for y in 0..40 {
            for x in 20..40 {
                gray.put_pixel(x, y, Luma([180]));
            }
        }

        let out = inject_edges(&gray, 0.8, 0.2);

        // Flat areas are scaled down by the base weight
        assert_eq!(out.get_pixel(5, 20).0[0], 80);
        // The boundary column picks up the edge term on top
        let edge_value = out.get_pixel(20, 20).0[0];
        assert!(edge_value > (0.8 * 180.0) as u8);
    }

    #[test]
    fn test_matching_lut_identity_on_same_distribution() {
        let gray = GrayImage::from_fn(64, 64, |x, _| Luma([(x * 4) as u8]));
        let histogram = gray_histogram(&gray);
        let lut = matching_lut(&histogram, &histogram);

        // Occupied intensities map to themselves
        for x in 0..64u32 {
            let v = (x * 4) as usize;
            assert_eq!(lut[v], v as u8);
        }
    }

    #[test]
    fn test_match_channels_identity() {
        let color = RgbImage::from_fn(64, 64, |x, _| {
            let v = (x * 4) as u8;
            Rgb([v, v, v])
        });
        let reference = GrayImage::from_fn(64, 64, |x, _| Luma([(x * 4) as u8]));

        let out = DetailEnhancer::match_channels(&color, &reference);
        assert_eq!(out, color);
    }

    #[test]
    fn test_match_channels_adopts_reference_spread() {
        // A dim channel matched against a bright reference must brighten
        let color = RgbImage::from_pixel(32, 32, Rgb([40, 40, 40]));
        let reference = GrayImage::from_pixel(32, 32, Luma([200]));

        let out = DetailEnhancer::match_channels(&color, &reference);
        assert_eq!(out.get_pixel(0, 0).0[0], 200);
    }

    #[test]
    fn test_cdf_reaches_one() {
        let gray = GrayImage::from_fn(16, 16, |x, y| Luma([((x + y) * 8) as u8]));
        let histogram = gray_histogram(&gray);
        let c = cdf(&histogram);
        assert!((c[255] - 1.0).abs() < 1e-12);
    }
}
