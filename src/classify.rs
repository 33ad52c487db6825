//! Blur classification
//!
//! Two deliberately different decision rules:
//!
//! - **Whole-image mode** - a weighted vote across four focus signals, used
//!   as a cheap pre-gate (e.g. deciding whether a capture is worth the
//!   per-object pipeline at all).
//! - **Per-object mode** - an OR gate over three signals with its own
//!   threshold set: a small ROI can fail on a single axis and still be
//!   unusable, so one vote is enough to flag it.
//!
//! The asymmetry is intentional; the two modes must not be unified.

use image::GrayImage;

use crate::config::ClassifyConfig;
use crate::metrics;

/// Whole-image blur verdict with the signals behind it
#[derive(Debug, Clone)]
pub struct ImageBlurReport {
    pub laplacian_variance: f64,
    pub sobel_mean_magnitude: f64,
    pub edge_density: f64,
    pub pixel_variance: f64,

    /// Weighted vote in [0, 1]; higher means more signals read blurred
    pub blur_score: f64,

    pub is_blurred: bool,

    /// Human-readable severity bucket
    pub description: String,
}

/// Focus profile of a single object ROI
///
/// All four metrics are computed over exactly the pixels of the region's
/// grayscale crop. Tenengrad and pixel variance scale with ROI content and
/// are not comparable across differently-sized ROIs; no cross-ROI
/// normalization is applied.
#[derive(Debug, Clone)]
pub struct ObjectBlurProfile {
    pub laplacian_variance: f64,
    pub sobel_magnitude: f64,
    pub pixel_variance: f64,
    pub tenengrad: f64,
    pub is_blurred: bool,
}

/// Blur classification entry points
pub struct BlurClassifier;

impl BlurClassifier {
    /// Whole-image weighted vote over the full grayscale frame
    pub fn classify_image(gray: &GrayImage, config: &ClassifyConfig) -> ImageBlurReport {
        let laplacian_variance = metrics::laplacian_variance(gray);
        let sobel_mean_magnitude = metrics::sobel_mean_magnitude(gray);
        let edge_density = metrics::edge_density(gray);
        let pixel_variance = metrics::pixel_variance(gray);

        let mut blur_score = 0.0;
        if laplacian_variance < config.image_laplacian_threshold {
            blur_score += config.image_laplacian_weight;
        }
        if sobel_mean_magnitude < config.image_sobel_threshold {
            blur_score += config.image_sobel_weight;
        }
        if edge_density < config.image_edge_density_threshold {
            blur_score += config.image_edge_density_weight;
        }
        if pixel_variance < config.image_variance_threshold {
            blur_score += config.image_variance_weight;
        }

        let is_blurred = blur_score > config.image_blur_score;
        let description =
            describe_severity(laplacian_variance, config.image_laplacian_threshold, is_blurred);

        ImageBlurReport {
            laplacian_variance,
            sobel_mean_magnitude,
            edge_density,
            pixel_variance,
            blur_score,
            is_blurred,
            description,
        }
    }

    /// Per-object OR gate over the region's grayscale crop
    pub fn classify_object(roi: &GrayImage, config: &ClassifyConfig) -> ObjectBlurProfile {
        let laplacian_variance = metrics::laplacian_variance(roi);
        let sobel_magnitude = metrics::sobel_mean_magnitude(roi);
        let pixel_variance = metrics::pixel_variance(roi);
        let tenengrad = metrics::tenengrad(roi);

        let is_blurred = laplacian_variance < config.object_laplacian_threshold
            || sobel_magnitude < config.object_sobel_threshold
            || pixel_variance < config.object_variance_threshold;

        ObjectBlurProfile {
            laplacian_variance,
            sobel_magnitude,
            pixel_variance,
            tenengrad,
            is_blurred,
        }
    }
}

/// Severity buckets relative to the Laplacian threshold
fn describe_severity(laplacian_variance: f64, threshold: f64, is_blurred: bool) -> String {
    let label = if is_blurred {
        if laplacian_variance < threshold / 3.0 {
            "Severely Blurred"
        } else if laplacian_variance < 2.0 * threshold / 3.0 {
            "Moderately Blurred"
        } else {
            "Slightly Blurred"
        }
    } else if laplacian_variance > 2.0 * threshold {
        "Very Sharp"
    } else if laplacian_variance > 4.0 * threshold / 3.0 {
        "Sharp"
    } else {
        "Acceptable Sharpness"
    };

    label.to_string()
}

// ============================================================
// Tests
// ============================================================
