//! Focus and sharpness metrics
//!
//! Pure, stateless functions computing focus signals over a single-channel
//! pixel buffer. Used both for whole-frame capture gating and for per-object
//! blur classification.
//!
//! All functions fail closed: a degenerate buffer (empty, or smaller than the
//! operator support) returns 0.0, which sits on the "blurred" side of every
//! threshold, so downstream decision logic always reaches a verdict.
//!
//! Metric values are computed over exactly the pixels of the given buffer and
//! are not normalized across differently-sized buffers; Tenengrad and pixel
//! variance in particular scale with buffer content and must not be compared
//! across ROIs of different sizes.

use image::GrayImage;
use imageproc::edges::canny;

/// Canny hysteresis thresholds for edge density
const EDGE_LOW_THRESHOLD: f32 = 50.0;
const EDGE_HIGH_THRESHOLD: f32 = 150.0;

/// Laplacian variance: the square of the standard deviation of the
/// 4-neighbour Laplacian response. Higher means sharper.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();

    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    // Laplacian kernel: [0, 1, 0; 1, -4, 1; 0, 1, 0]
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = gray.get_pixel(x, y).0[0] as f64;
            let top = gray.get_pixel(x, y - 1).0[0] as f64;
            let bottom = gray.get_pixel(x, y + 1).0[0] as f64;
            let left = gray.get_pixel(x - 1, y).0[0] as f64;
            let right = gray.get_pixel(x + 1, y).0[0] as f64;

            let laplacian = top + bottom + left + right - 4.0 * center;

            sum += laplacian;
            sum_sq += laplacian * laplacian;
            count += 1;
        }
    }

    if count == 0 {
        return 0.0;
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);

    variance.abs()
}

/// Mean Euclidean magnitude of the horizontal and vertical Sobel derivatives.
pub fn sobel_mean_magnitude(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();

    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut total = 0.0f64;
    let mut count = 0u64;

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let (gx, gy) = sobel_at(gray, x, y);
            total += (gx * gx + gy * gy).sqrt();
            count += 1;
        }
    }

    if count == 0 {
        return 0.0;
    }

    total / count as f64
}

/// Tenengrad focus measure: total gradient energy, the sum of squared Sobel
/// magnitudes over all pixels. Unnormalized.
pub fn tenengrad(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();

    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut total = 0.0f64;

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let (gx, gy) = sobel_at(gray, x, y);
            total += gx * gx + gy * gy;
        }
    }

    total
}

/// Variance of the raw pixel intensities.
pub fn pixel_variance(gray: &GrayImage) -> f64 {
    let count = gray.width() as u64 * gray.height() as u64;
    if count == 0 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;

    for pixel in gray.pixels() {
        let v = pixel.0[0] as f64;
        sum += v;
        sum_sq += v * v;
    }

    let mean = sum / count as f64;
    ((sum_sq / count as f64) - (mean * mean)).max(0.0)
}

/// Fraction of pixels marked as edges by Canny detection with fixed
/// hysteresis thresholds.
pub fn edge_density(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();

    if width < 3 || height < 3 {
        return 0.0;
    }

    let edges = canny(gray, EDGE_LOW_THRESHOLD, EDGE_HIGH_THRESHOLD);
    let edge_pixels = edges.pixels().filter(|p| p.0[0] > 0).count();

    edge_pixels as f64 / (width as f64 * height as f64)
}

/// 3x3 Sobel derivatives at an interior pixel
#[inline]
fn sobel_at(gray: &GrayImage, x: u32, y: u32) -> (f64, f64) {
    let p = |dx: i32, dy: i32| -> f64 {
        gray.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32).0[0] as f64
    };

    let gx = p(1, -1) + 2.0 * p(1, 0) + p(1, 1) - p(-1, -1) - 2.0 * p(-1, 0) - p(-1, 1);
    let gy = p(-1, 1) + 2.0 * p(0, 1) + p(1, 1) - p(-1, -1) - 2.0 * p(0, -1) - p(1, -1);

    (gx, gy)
}

// ============================================================
// Tests
// ============================================================
