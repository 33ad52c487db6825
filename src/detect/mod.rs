//! Candidate object detection
//!
//! Three independent strategies propose regions:
//!
//! - **Contour** ([`contour`]) - dual-mask binarization + external contours
//! - **Blob** ([`blob`]) - circular Hough transform for round objects
//! - **Watershed** ([`watershed`]) - distance-transform markers for touching objects
//!
//! Each strategy owns its own preprocessing; they share only the read-only
//! input frame. [`fusion`] reconciles their proposals into one object set.

pub mod blob;
pub mod contour;
pub mod fusion;
pub mod types;
pub mod watershed;

use image::GrayImage;

use crate::config::{DetectionConfig, FusionConfig};

pub use blob::BlobStrategy;
pub use contour::ContourStrategy;
pub use fusion::merge_duplicates;
pub use types::{DetectionSet, Region, StrategyKind};
pub use watershed::WatershedStrategy;

/// A candidate-proposing detection strategy
///
/// Implementations are stateless; `detect` may be called concurrently on
/// shared input since nothing is mutated.
pub trait DetectionStrategy {
    /// Which strategy this is, for provenance tagging
    fn kind(&self) -> StrategyKind;

    /// Propose candidate regions for one grayscale frame
    fn detect(&self, gray: &GrayImage, config: &DetectionConfig) -> Vec<Region>;
}

/// Run all three strategies and return the combined raw candidates
pub fn detect_candidates(gray: &GrayImage, config: &DetectionConfig) -> Vec<Region> {
    let strategies: [&dyn DetectionStrategy; 3] =
        [&ContourStrategy, &BlobStrategy, &WatershedStrategy];

    let mut candidates = Vec::new();
    for strategy in strategies {
        candidates.extend(strategy.detect(gray, config));
    }
    candidates
}

/// Full detection: all strategies plus fusion, with provenance count
pub fn detect_objects(
    gray: &GrayImage,
    detection: &DetectionConfig,
    fusion: &FusionConfig,
) -> DetectionSet {
    let candidates = detect_candidates(gray, detection);
    let raw_candidates = candidates.len();
    let regions = merge_duplicates(candidates, fusion);

    DetectionSet {
        regions,
        raw_candidates,
    }
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
    fn test_single_disc_fuses_to_one_region() {
        // Contour and blob both fire on a sharp disc; fusion leaves one
        let gray = white_with_black_disc(200, 100, 100, 20);

        let detection = DetectionConfig::default();
        let candidates = detect_candidates(&gray, &detection);
        assert!(
            candidates.len() >= 2,
            "at least two strategies should propose the disc, got {}",
            candidates.len()
        );
        assert!(candidates.iter().any(|r| r.strategy == StrategyKind::Contour));
        assert!(candidates.iter().any(|r| r.strategy == StrategyKind::Blob));

        let set = detect_objects(&gray, &detection, &FusionConfig::default());
        assert_eq!(set.regions.len(), 1);
        assert_eq!(set.raw_candidates, candidates.len());
    }

    #[test]
    fn test_blank_image_empty_set() {
        let gray = GrayImage::from_pixel(100, 100, Luma([200]));
        let set = detect_objects(
            &gray,
            &DetectionConfig::default(),
            &FusionConfig::default(),
        );
        assert!(set.is_empty());
        assert_eq!(set.raw_candidates, 0);
    }

    #[test]
    fn test_strategies_do_not_interfere() {
        // Same results whether strategies run together or alone
        let gray = white_with_black_disc(150, 75, 75, 18);
        let config = DetectionConfig::default();

        let solo = ContourStrategy.detect(&gray, &config);
        let combined = detect_candidates(&gray, &config);

        let combined_contour: Vec<_> = combined
            .iter()
            .filter(|r| r.strategy == StrategyKind::Contour)
            .collect();

        assert_eq!(solo.len(), combined_contour.len());
        for (a, b) in solo.iter().zip(combined_contour.iter()) {
            assert_eq!(a.x, b.x);
            assert_eq!(a.y, b.y);
        }
    }
}
