//! Small-kernel spatial filters shared by the detection and restoration stages
//!
//! These operate on plain float buffers or `GrayImage`s with replicated
//! borders, so callers keep full control over value ranges.

use image::{GrayImage, Luma};

/// Generate a normalized 1-D Gaussian kernel
pub fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let half = (size / 2) as i32;
    let mut kernel = Vec::with_capacity(size);
    let mut sum = 0.0f32;

    for i in 0..size {
        let x = (i as i32 - half) as f32;
        let g = (-x * x / (2.0 * sigma * sigma)).exp();
        kernel.push(g);
        sum += g;
    }

    for k in &mut kernel {
        *k /= sum;
    }

    kernel
}

/// Separable 2-D convolution with a symmetric 1-D kernel, replicated borders
pub fn convolve_separable(data: &[f32], width: u32, height: u32, kernel: &[f32]) -> Vec<f32> {
    let w = width as usize;
    let h = height as usize;
    let k_half = kernel.len() / 2;

    // Horizontal pass
    let mut temp = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut sum = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as i32 + ki as i32 - k_half as i32).clamp(0, w as i32 - 1) as usize;
                sum += data[y * w + sx] * kv;
            }
            temp[y * w + x] = sum;
        }
    }

    // Vertical pass
    let mut result = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut sum = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as i32 + ki as i32 - k_half as i32).clamp(0, h as i32 - 1) as usize;
                sum += temp[sy * w + x] * kv;
            }
            result[y * w + x] = sum;
        }
    }

    result
}

/// Gaussian blur of an 8-bit grayscale buffer
pub fn gaussian_blur(gray: &GrayImage, sigma: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 || sigma <= 0.0 {
        return gray.clone();
    }

    let kernel_size = ((sigma * 6.0).ceil() as usize) | 1;
    let kernel = gaussian_kernel(kernel_size, sigma);

    let data: Vec<f32> = gray.pixels().map(|p| p.0[0] as f32).collect();
    let blurred = convolve_separable(&data, width, height, &kernel);

    GrayImage::from_fn(width, height, |x, y| {
        Luma([blurred[(y * width + x) as usize].clamp(0.0, 255.0).round() as u8])
    })
}

/// Full 2-D correlation with an arbitrary kernel, replicated borders.
/// (Correlation, not convolution: the kernel is not flipped. Callers that
/// need convolution flip the kernel themselves.)
pub fn correlate2d(
    data: &[f64],
    width: u32,
    height: u32,
    kernel: &[f64],
    kernel_size: u32,
) -> Vec<f64> {
    let w = width as i32;
    let h = height as i32;
    let k = kernel_size as i32;
    let k_half = k / 2;

    let mut result = vec![0.0f64; data.len()];

    for y in 0..h {
        for x in 0..w {
            let mut sum = 0.0f64;
            for ky in 0..k {
                for kx in 0..k {
                    let sx = (x + kx - k_half).clamp(0, w - 1);
                    let sy = (y + ky - k_half).clamp(0, h - 1);
                    sum += data[(sy * w + sx) as usize] * kernel[(ky * k + kx) as usize];
                }
            }
            result[(y * w + x) as usize] = sum;
        }
    }

    result
}

/// Edge-preserving bilateral filter on an 8-bit grayscale buffer
pub fn bilateral_filter(
    gray: &GrayImage,
    radius: u32,
    sigma_color: f64,
    sigma_space: f64,
) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 || radius == 0 {
        return gray.clone();
    }

    let r = radius as i32;
    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    // Pre-computed spatial weights for the window
    let side = (2 * r + 1) as usize;
    let mut spatial = vec![0.0f64; side * side];
    for dy in -r..=r {
        for dx in -r..=r {
            let d2 = (dx * dx + dy * dy) as f64;
            spatial[((dy + r) * (2 * r + 1) + (dx + r)) as usize] = (d2 * space_coeff).exp();
        }
    }

    let mut out = GrayImage::new(width, height);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let center = gray.get_pixel(x as u32, y as u32).0[0] as f64;
            let mut weight_sum = 0.0f64;
            let mut value_sum = 0.0f64;

            for dy in -r..=r {
                for dx in -r..=r {
                    let sx = (x + dx).clamp(0, width as i32 - 1) as u32;
                    let sy = (y + dy).clamp(0, height as i32 - 1) as u32;
                    let v = gray.get_pixel(sx, sy).0[0] as f64;

                    let dc = v - center;
                    let w = spatial[((dy + r) * (2 * r + 1) + (dx + r)) as usize]
                        * (dc * dc * color_coeff).exp();

                    weight_sum += w;
                    value_sum += w * v;
                }
            }

            let filtered = if weight_sum > 0.0 {
                value_sum / weight_sum
            } else {
                center
            };
            out.put_pixel(x as u32, y as u32, Luma([filtered.clamp(0.0, 255.0) as u8]));
        }
    }

    out
}

/// Local mean over a (2r+1)² window for every pixel, via an integral image
pub fn box_mean(gray: &GrayImage, radius: u32) -> Vec<f64> {
    let (width, height) = gray.dimensions();
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 {
        return Vec::new();
    }

    // Integral image with a zero top row / left column
    let mut integral = vec![0u64; (w + 1) * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += gray.get_pixel(x as u32, y as u32).0[0] as u64;
            integral[(y + 1) * (w + 1) + (x + 1)] = integral[y * (w + 1) + (x + 1)] + row_sum;
        }
    }

    let r = radius as i32;
    let mut means = vec![0.0f64; w * h];
    for y in 0..h as i32 {
        for x in 0..w as i32 {
            let x0 = (x - r).max(0) as usize;
            let y0 = (y - r).max(0) as usize;
            let x1 = (x + r + 1).min(w as i32) as usize;
            let y1 = (y + r + 1).min(h as i32) as usize;

            let sum = integral[y1 * (w + 1) + x1] + integral[y0 * (w + 1) + x0]
                - integral[y0 * (w + 1) + x1]
                - integral[y1 * (w + 1) + x0];
            let count = ((x1 - x0) * (y1 - y0)) as f64;
            means[y as usize * w + x as usize] = sum as f64 / count;
        }
    }

    means
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussian_kernel_normalized() {
        let kernel = gaussian_kernel(5, 1.0);
        assert_eq!(kernel.len(), 5);

        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 0.001);

        assert!(kernel[2] > kernel[0]);
        assert!(kernel[2] > kernel[4]);
    }

    #[test]
    fn test_convolve_separable_preserves_constant() {
        let data = vec![42.0f32; 20 * 10];
        let kernel = gaussian_kernel(5, 1.5);
        let result = convolve_separable(&data, 20, 10, &kernel);
        for v in result {
            assert!((v - 42.0).abs() < 0.01);
        }
    }

    #[test]
    fn test_gaussian_blur_smooths_impulse() {
        let mut gray = GrayImage::from_pixel(21, 21, Luma([0]));
        gray.put_pixel(10, 10, Luma([255]));

        let blurred = gaussian_blur(&gray, 2.0);
        let center = blurred.get_pixel(10, 10).0[0];
        let neighbor = blurred.get_pixel(11, 10).0[0];

        assert!(center < 255);
        assert!(neighbor > 0);
        assert!(center >= neighbor);
    }

    #[test]
    fn test_correlate2d_identity_kernel() {
        let data: Vec<f64> = (0..25).map(|v| v as f64).collect();
        let kernel = vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let result = correlate2d(&data, 5, 5, &kernel, 3);
        assert_eq!(result, data);
    }

    #[test]
    fn test_bilateral_preserves_step_edge() {
        let mut gray = GrayImage::from_pixel(20, 20, Luma([0]));
        for y in 0..20 {
            for x in 10..20 {
                gray.put_pixel(x, y, Luma([200]));
            }
        }

        let filtered = bilateral_filter(&gray, 2, 30.0, 2.0);

        // Pixels away from the edge keep their side's value
        assert!(filtered.get_pixel(2, 10).0[0] < 20);
        assert!(filtered.get_pixel(17, 10).0[0] > 180);
    }

    #[test]
    fn test_bilateral_smooths_small_noise() {
        let mut gray = GrayImage::from_pixel(15, 15, Luma([100]));
        gray.put_pixel(7, 7, Luma([112]));

        let filtered = bilateral_filter(&gray, 2, 50.0, 2.0);
        let center = filtered.get_pixel(7, 7).0[0];
        assert!(center < 112);
        assert!(center >= 100);
    }

    #[test]
    fn test_box_mean_constant() {
        let gray = GrayImage::from_pixel(12, 9, Luma([64]));
        let means = box_mean(&gray, 3);
        for m in means {
            assert!((m - 64.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_box_mean_window_bounds() {
        // 3x3 image, center mean over full window = average of all pixels
        let mut gray = GrayImage::from_pixel(3, 3, Luma([0]));
        gray.put_pixel(1, 1, Luma([90]));
        let means = box_mean(&gray, 1);
        assert!((means[4] - 10.0).abs() < 1e-9);
    }
}
