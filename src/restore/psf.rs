//! Point-spread-function estimation
//!
//! Approximates the blur kernel of a region as an isotropic Gaussian whose
//! size follows the object size and whose sigma follows the measured blur:
//! lower Laplacian variance (more blur) yields a larger sigma, bounded to
//! keep the kernel well-conditioned for deconvolution.

use crate::config::RestoreConfig;

/// Estimated blur kernel for one region
#[derive(Debug, Clone)]
pub struct PsfEstimate {
    /// Kernel side length, always odd
    pub size: u32,

    /// Gaussian sigma used to build the kernel
    pub sigma: f64,

    /// Row-major size×size coefficients, summing to 1
    pub kernel: Vec<f64>,
}

impl PsfEstimate {
    /// Kernel rotated by 180°, as used by the correlation step of
    /// Richardson-Lucy
    pub fn flipped(&self) -> Vec<f64> {
        let mut flipped = self.kernel.clone();
        flipped.reverse();
        flipped
    }
}

/// PSF estimator
pub struct PsfEstimator;

impl PsfEstimator {
    /// Estimate a PSF from a region's area and measured Laplacian variance
    pub fn estimate(area: f64, laplacian_variance: f64, config: &RestoreConfig) -> PsfEstimate {
        let size = Self::kernel_size(area, config);
        let sigma = Self::blur_sigma(laplacian_variance, config);
        let kernel = Self::gaussian_2d(size, sigma);

        PsfEstimate {
            size,
            sigma,
            kernel,
        }
    }

    /// Kernel size scales with object size: sqrt(area)/10, odd, clamped
    fn kernel_size(area: f64, config: &RestoreConfig) -> u32 {
        let raw = (area.max(0.0).sqrt() / 10.0) as u32;
        let clamped = raw.clamp(config.psf_min_size, config.psf_max_size);
        if clamped % 2 == 0 {
            (clamped + 1).min(config.psf_max_size | 1)
        } else {
            clamped
        }
    }

    /// Sigma grows as measured variance shrinks, clamped to the config bounds
    fn blur_sigma(laplacian_variance: f64, config: &RestoreConfig) -> f64 {
        let normalized = laplacian_variance.max(1.0) / 100.0;
        (2.0 / normalized).clamp(config.psf_sigma_min, config.psf_sigma_max)
    }

    /// Normalized 2-D Gaussian kernel
    fn gaussian_2d(size: u32, sigma: f64) -> Vec<f64> {
        let center = (size / 2) as f64;
        let mut kernel = Vec::with_capacity((size * size) as usize);
        let mut sum = 0.0f64;

        for y in 0..size {
            for x in 0..size {
                let dx = x as f64 - center;
                let dy = y as f64 - center;
                let value = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
                kernel.push(value);
                sum += value;
            }
        }

        for value in &mut kernel {
            *value /= sum;
        }

        kernel
    }
}

// ============================================================
// Tests
// ============================================================
