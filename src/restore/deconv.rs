//! Deconvolution method selection and the three restoration algorithms
//!
//! Per region, in severity order:
//!
//! 1. Severe blur (low Laplacian variance) - Richardson-Lucy iterative
//!    deconvolution: multiplicative updates, energy- and
//!    non-negativity-preserving by construction.
//! 2. Moderate blur (low Sobel magnitude) - Wiener inverse filtering in the
//!    frequency domain, with the noise-to-signal ratio estimated from the
//!    region's own statistics.
//! 3. Mild blur - unsharp masking.
//!
//! Restoration is best-effort: every method falls back to the next-simpler
//! one on numerical failure, ending at unsharp masking and, for ROIs too
//! small to filter, the identity.

use image::{GrayImage, Luma};
use rustfft::{num_complex::Complex, FftPlanner};
use tracing::{debug, warn};

use crate::classify::ObjectBlurProfile;
use crate::config::RestoreConfig;
use crate::filters;

use super::psf::PsfEstimator;

/// Floor for the Richardson-Lucy divisor
const RL_EPSILON: f64 = 1e-10;

/// Which restoration algorithm produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorationMethod {
    RichardsonLucy,
    Wiener,
    UnsharpMask,
    Identity,
}

impl RestorationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestorationMethod::RichardsonLucy => "richardson-lucy",
            RestorationMethod::Wiener => "wiener",
            RestorationMethod::UnsharpMask => "unsharp-mask",
            RestorationMethod::Identity => "identity",
        }
    }
}

/// Restoration method selection and execution
pub struct Deconvolver;

impl Deconvolver {
    /// Restore a grayscale ROI according to its blur profile.
    ///
    /// `area` is the owning region's contour area, which drives the PSF size.
    pub fn restore(
        gray: &GrayImage,
        area: f64,
        profile: &ObjectBlurProfile,
        config: &RestoreConfig,
    ) -> (GrayImage, RestorationMethod) {
        let (width, height) = gray.dimensions();
        if width < 3 || height < 3 {
            return (gray.clone(), RestorationMethod::Identity);
        }

        // A featureless ROI gives the deconvolution methods nothing to work
        // with; their selection gates degenerate straight to unsharp masking
        if profile.pixel_variance > f64::EPSILON {
            if profile.laplacian_variance < config.severe_laplacian {
                debug!("severe blur: richardson-lucy");
                if let Some(restored) = Self::richardson_lucy(gray, area, profile, config) {
                    return (restored, RestorationMethod::RichardsonLucy);
                }
                warn!("richardson-lucy failed, falling back to wiener");
                if let Some(restored) = Self::wiener(gray, area, profile, config) {
                    return (restored, RestorationMethod::Wiener);
                }
                warn!("wiener failed, falling back to unsharp masking");
            } else if profile.sobel_magnitude < config.moderate_sobel {
                debug!("moderate blur: wiener");
                if let Some(restored) = Self::wiener(gray, area, profile, config) {
                    return (restored, RestorationMethod::Wiener);
                }
                warn!("wiener failed, falling back to unsharp masking");
            }
        }

        (
            Self::unsharp_mask(gray, config.unsharp_sigma, config.unsharp_amount),
            RestorationMethod::UnsharpMask,
        )
    }

    /// Richardson-Lucy iterative deconvolution.
    ///
    /// Returns None if the estimate leaves the finite range, so the caller
    /// can fall back.
    fn richardson_lucy(
        gray: &GrayImage,
        area: f64,
        profile: &ObjectBlurProfile,
        config: &RestoreConfig,
    ) -> Option<GrayImage> {
        let (width, height) = gray.dimensions();
        let psf = PsfEstimator::estimate(area, profile.laplacian_variance, config);
        let psf_flipped = psf.flipped();

        let observed: Vec<f64> = gray.pixels().map(|p| p.0[0] as f64 / 255.0).collect();
        let mut estimate = observed.clone();

        for _ in 0..config.rl_iterations {
            let convolved = filters::correlate2d(&estimate, width, height, &psf.kernel, psf.size);

            let mut ratio = vec![0.0f64; observed.len()];
            for i in 0..observed.len() {
                ratio[i] = observed[i] / convolved[i].max(RL_EPSILON);
            }

            let correction = filters::correlate2d(&ratio, width, height, &psf_flipped, psf.size);

            for i in 0..estimate.len() {
                estimate[i] *= correction[i];
            }
        }

        if estimate.iter().any(|v| !v.is_finite()) {
            return None;
        }

        // Back to 8-bit, never leaving the observed value range
        let (input_min, input_max) = value_range(gray);
        let mut out = GrayImage::new(width, height);
        for (i, pixel) in out.pixels_mut().enumerate() {
            let v = (estimate[i] * 255.0).clamp(input_min as f64, input_max as f64);
            pixel.0[0] = v.round() as u8;
        }

        Some(out)
    }

    /// Frequency-domain Wiener filtering: conj(H) / (|H|² + NSR)
    fn wiener(
        gray: &GrayImage,
        area: f64,
        profile: &ObjectBlurProfile,
        config: &RestoreConfig,
    ) -> Option<GrayImage> {
        let (width, height) = gray.dimensions();
        let psf = PsfEstimator::estimate(area, profile.laplacian_variance, config);
        let nsr = Self::noise_to_signal_ratio(profile, config);

        // Pad to an efficient transform size
        let n = (width.max(height) as usize).next_power_of_two().max(8);

        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);

        // Observed image, zero-padded
        let mut image_freq = vec![Complex::new(0.0, 0.0); n * n];
        for y in 0..height as usize {
            for x in 0..width as usize {
                image_freq[y * n + x] =
                    Complex::new(gray.get_pixel(x as u32, y as u32).0[0] as f64, 0.0);
            }
        }

        // PSF with its center wrapped to the origin, so the filter does not
        // translate the image
        let mut psf_freq = vec![Complex::new(0.0, 0.0); n * n];
        let k = psf.size as usize;
        let half = k / 2;
        for ky in 0..k {
            for kx in 0..k {
                let ty = (ky + n - half) % n;
                let tx = (kx + n - half) % n;
                psf_freq[ty * n + tx] = Complex::new(psf.kernel[ky * k + kx], 0.0);
            }
        }

        fft_2d(&mut image_freq, n, forward.as_ref());
        fft_2d(&mut psf_freq, n, forward.as_ref());

        // Apply the Wiener filter per frequency bin
        for i in 0..n * n {
            let h = psf_freq[i];
            let denominator = h.norm_sqr() + nsr;
            image_freq[i] = h.conj() / denominator * image_freq[i];
        }

        fft_2d(&mut image_freq, n, inverse.as_ref());

        let norm = 1.0 / (n * n) as f64;
        let mut out = GrayImage::new(width, height);
        for y in 0..height as usize {
            for x in 0..width as usize {
                let v = image_freq[y * n + x].re * norm;
                if !v.is_finite() {
                    return None;
                }
                out.put_pixel(x as u32, y as u32, Luma([v.clamp(0.0, 255.0) as u8]));
            }
        }

        Some(out)
    }

    /// Unsharp masking: original + amount · (original − blurred)
    pub fn unsharp_mask(gray: &GrayImage, sigma: f32, amount: f32) -> GrayImage {
        let (width, height) = gray.dimensions();

        let original: Vec<f32> = gray.pixels().map(|p| p.0[0] as f32).collect();
        let kernel_size = ((sigma * 6.0).ceil() as usize) | 1;
        let kernel = filters::gaussian_kernel(kernel_size, sigma);
        let blurred = filters::convolve_separable(&original, width, height, &kernel);

        let mut out = GrayImage::new(width, height);
        for (i, pixel) in out.pixels_mut().enumerate() {
            let sharpened = original[i] + amount * (original[i] - blurred[i]);
            pixel.0[0] = sharpened.clamp(0.0, 255.0).round() as u8;
        }

        out
    }

    /// NSR from the region's own statistics: noisier, flatter regions get a
    /// stronger noise term
    fn noise_to_signal_ratio(profile: &ObjectBlurProfile, config: &RestoreConfig) -> f64 {
        let edge_energy = (profile.tenengrad / 1000.0).max(1.0);
        let raw = profile.pixel_variance / edge_energy / 10000.0;
        raw.clamp(config.nsr_min, config.nsr_max)
    }
}

/// In-place 2-D FFT by row-column decomposition on an n×n buffer
fn fft_2d(data: &mut [Complex<f64>], n: usize, fft: &dyn rustfft::Fft<f64>) {
    for row in 0..n {
        fft.process(&mut data[row * n..(row + 1) * n]);
    }

    transpose_inplace(data, n);

    for row in 0..n {
        fft.process(&mut data[row * n..(row + 1) * n]);
    }

    transpose_inplace(data, n);
}

fn transpose_inplace(data: &mut [Complex<f64>], n: usize) {
    for y in 0..n {
        for x in (y + 1)..n {
            data.swap(y * n + x, x * n + y);
        }
    }
}

/// Min and max pixel value of a buffer
fn value_range(gray: &GrayImage) -> (u8, u8) {
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for pixel in gray.pixels() {
        min = min.min(pixel.0[0]);
        max = max.max(pixel.0[0]);
    }
    (min, max)
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics;

    fn profile(laplacian: f64, sobel: f64, variance: f64, tenengrad: f64) -> ObjectBlurProfile {
        ObjectBlurProfile {
            laplacian_variance: laplacian,
            sobel_magnitude: sobel,
            pixel_variance: variance,
            tenengrad,
            is_blurred: true,
        }
    }

    fn soft_disc(size: u32, radius: f64) -> GrayImage {
        // A heavily defocused disc: intensity ramps over several pixels
        let center = size as f64 / 2.0;
        GrayImage::from_fn(size, size, |x, y| {
            let dx = x as f64 - center;
            let dy = y as f64 - center;
            let d = (dx * dx + dy * dy).sqrt();
            let v = 255.0 / (1.0 + ((d - radius) / 3.0).exp());
            Luma([v as u8])
        })
    }

    #[test]
    fn test_tiny_roi_is_identity() {
        let gray = GrayImage::from_pixel(2, 2, Luma([100]));
        let (restored, method) = Deconvolver::restore(
            &gray,
            4.0,
            &profile(0.0, 0.0, 0.0, 0.0),
            &RestoreConfig::default(),
        );
        assert_eq!(method, RestorationMethod::Identity);
        assert_eq!(restored, gray);
    }

    #[test]
    fn test_featureless_roi_takes_unsharp_path_unchanged() {
        // All-white ROI: the severity gates degenerate to unsharp masking,
        // and with no edges to sharpen the content is untouched
        let gray = GrayImage::from_pixel(100, 100, Luma([255]));
        let (restored, method) = Deconvolver::restore(
            &gray,
            10000.0,
            &profile(0.0, 0.0, 0.0, 0.0),
            &RestoreConfig::default(),
        );

        assert_eq!(method, RestorationMethod::UnsharpMask);
        assert_eq!(restored, gray);
    }

    #[test]
    fn test_severe_blur_selects_richardson_lucy() {
        let gray = soft_disc(48, 15.0);
        let (restored, method) = Deconvolver::restore(
            &gray,
            700.0,
            &profile(20.0, 10.0, 5000.0, 1e6),
            &RestoreConfig::default(),
        );

        assert_eq!(method, RestorationMethod::RichardsonLucy);
        assert_eq!(restored.dimensions(), gray.dimensions());
    }

    #[test]
    fn test_richardson_lucy_stays_in_input_range() {
        let gray = soft_disc(40, 12.0);
        let (min, max) = value_range(&gray);

        let (restored, method) = Deconvolver::restore(
            &gray,
            450.0,
            &profile(10.0, 5.0, 4000.0, 1e6),
            &RestoreConfig::default(),
        );
        assert_eq!(method, RestorationMethod::RichardsonLucy);

        for pixel in restored.pixels() {
            assert!(pixel.0[0] >= min && pixel.0[0] <= max);
        }
    }

    #[test]
    fn test_moderate_blur_selects_wiener() {
        let gray = soft_disc(48, 15.0);
        let (restored, method) = Deconvolver::restore(
            &gray,
            700.0,
            &profile(80.0, 10.0, 5000.0, 1e6),
            &RestoreConfig::default(),
        );

        assert_eq!(method, RestorationMethod::Wiener);
        assert_eq!(restored.dimensions(), gray.dimensions());
    }

    #[test]
    fn test_mild_blur_selects_unsharp() {
        let gray = soft_disc(48, 15.0);
        let (_, method) = Deconvolver::restore(
            &gray,
            700.0,
            &profile(200.0, 60.0, 5000.0, 1e6),
            &RestoreConfig::default(),
        );
        assert_eq!(method, RestorationMethod::UnsharpMask);
    }

    #[test]
    fn test_unsharp_sharpens_soft_edge() {
        let gray = soft_disc(60, 20.0);
        let before = metrics::sobel_mean_magnitude(&gray);

        let sharpened = Deconvolver::unsharp_mask(&gray, 1.0, 1.5);
        let after = metrics::sobel_mean_magnitude(&sharpened);

        assert!(after > before, "unsharp should raise edge energy");
    }

    #[test]
    fn test_unsharp_leaves_uniform_unchanged() {
        let gray = GrayImage::from_pixel(30, 30, Luma([180]));
        let out = Deconvolver::unsharp_mask(&gray, 1.5, 2.0);
        assert_eq!(out, gray);
    }

    #[test]
    fn test_nsr_clamped() {
        let config = RestoreConfig::default();

        // Flat noisy region: high variance, no edges
        let noisy = profile(0.0, 0.0, 1e9, 0.0);
        let nsr = Deconvolver::noise_to_signal_ratio(&noisy, &config);
        assert_eq!(nsr, config.nsr_max);

        // Clean edge-rich region
        let crisp = profile(0.0, 0.0, 1.0, 1e9);
        let nsr = Deconvolver::noise_to_signal_ratio(&crisp, &config);
        assert_eq!(nsr, config.nsr_min);
    }

    #[test]
    fn test_fft_round_trip() {
        let n = 8;
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);

        let original: Vec<Complex<f64>> = (0..n * n)
            .map(|i| Complex::new((i % 7) as f64, 0.0))
            .collect();
        let mut data = original.clone();

        fft_2d(&mut data, n, forward.as_ref());
        fft_2d(&mut data, n, inverse.as_ref());

        let norm = 1.0 / (n * n) as f64;
        for (a, b) in data.iter().zip(original.iter()) {
            assert!((a.re * norm - b.re).abs() < 1e-9);
        }
    }

    #[test]
    fn test_wiener_recovers_gaussian_blur() {
        // Blur a crisp disc with the same Gaussian family the PSF models;
        // Wiener filtering should raise edge energy again
        let crisp = GrayImage::from_fn(64, 64, |x, y| {
            let dx = x as f64 - 32.0;
            let dy = y as f64 - 32.0;
            if (dx * dx + dy * dy).sqrt() < 18.0 {
                Luma([30])
            } else {
                Luma([220])
            }
        });
        let blurred = filters::gaussian_blur(&crisp, 2.0);

        let p = profile(
            metrics::laplacian_variance(&blurred).min(49.0),
            10.0,
            metrics::pixel_variance(&blurred),
            metrics::tenengrad(&blurred),
        );

        let restored =
            Deconvolver::wiener(&blurred, 1000.0, &p, &RestoreConfig::default()).unwrap();
        assert!(
            metrics::sobel_mean_magnitude(&restored) > metrics::sobel_mean_magnitude(&blurred)
        );
    }
}
