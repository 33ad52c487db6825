//! Restoration of blurred regions
//!
//! - **PSF estimation** ([`psf`]) - Gaussian blur kernel per region
//! - **Deconvolution** ([`deconv`]) - Richardson-Lucy / Wiener / unsharp masking
//! - **Detail enhancement** ([`enhance`]) - ringing suppression, local
//!   contrast, color recombination
//!
//! The public entry point is [`restore_region`], which runs the full chain
//! on one ROI and reports the method used plus the measured quality gain.

pub mod deconv;
pub mod enhance;
pub mod psf;

use image::{GrayImage, RgbImage};
use tracing::debug;

use crate::classify::ObjectBlurProfile;
use crate::config::{EnhanceConfig, RestoreConfig};
use crate::metrics;

pub use deconv::{Deconvolver, RestorationMethod};
pub use enhance::DetailEnhancer;
pub use psf::{PsfEstimate, PsfEstimator};

/// Outcome of restoring one region
#[derive(Debug, Clone)]
pub struct RestorationResult {
    /// Restored pixels, same size as the input ROI
    pub restored: RgbImage,

    /// Algorithm that produced the result
    pub method: RestorationMethod,

    /// Edge-energy gain over the original, in percent, never negative;
    /// 0 when restoration could not improve sharpness
    pub quality_improvement: f64,
}

/// Restore one blurred ROI: deconvolution on the grayscale proxy, detail
/// enhancement, then per-channel recombination into color.
pub fn restore_region(
    color_roi: &RgbImage,
    gray_roi: &GrayImage,
    area: f64,
    profile: &ObjectBlurProfile,
    restore: &RestoreConfig,
    enhance: &EnhanceConfig,
) -> RestorationResult {
    let (deblurred, method) = Deconvolver::restore(gray_roi, area, profile, restore);
    let enhanced = DetailEnhancer::enhance(&deblurred, enhance);
    let restored = DetailEnhancer::match_channels(color_roi, &enhanced);

    let quality_improvement = quality_improvement(gray_roi, &enhanced);
    debug!(
        method = method.as_str(),
        quality_improvement, "region restored"
    );

    RestorationResult {
        restored,
        method,
        quality_improvement,
    }
}

/// Relative edge-energy gain as a percentage, floored at zero
fn quality_improvement(original: &GrayImage, restored: &GrayImage) -> f64 {
    let before = metrics::sobel_mean_magnitude(original);
    let after = metrics::sobel_mean_magnitude(restored);

    ((after - before) / before.max(1.0) * 100.0).max(0.0)
}

// ============================================================
// Tests
// ============================================================
