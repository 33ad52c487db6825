//! Pipeline configuration
//!
//! Every threshold used by the analysis stages lives here rather than in the
//! algorithms, because all of them are lighting- and object-class dependent.
//! Values can come from `grainscan.toml` (working directory), the user config
//! directory, or CLI overrides, with the CLI taking precedence.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::{AnalysisError, Result};

// ============================================================
// Sections
// ============================================================

/// Candidate detection parameters (all three strategies)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum contour area as a fraction of image area
    pub min_area_ratio: f64,

    /// Maximum contour area as a fraction of image area
    pub max_area_ratio: f64,

    /// Minimum bounding-box side in pixels
    pub min_object_px: u32,

    /// Contour strategy: minimum circularity (4πA/P²)
    pub min_circularity: f64,

    /// Contour strategy: maximum aspect ratio (max side / min side)
    pub max_aspect_ratio: f64,

    /// Contour strategy: required brightness difference from the background median
    pub brightness_offset: u8,

    /// Contour strategy: floor for the global brightness threshold
    pub brightness_floor: u8,

    /// Contour strategy: adaptive threshold window radius (window = 2r+1)
    pub adaptive_block_radius: u32,

    /// Contour strategy: adaptive threshold offset below the local mean
    pub adaptive_offset: i16,

    /// Blob strategy: minimum circle radius in pixels
    pub blob_min_radius: u32,

    /// Blob strategy: maximum circle radius in pixels
    pub blob_max_radius: u32,

    /// Blob strategy: minimum distance between accepted circle centers
    pub blob_min_distance: u32,

    /// Blob strategy: accumulator votes required to accept a circle
    pub blob_accumulator_threshold: f32,

    /// Blob strategy: Canny hysteresis thresholds for the edge map
    pub blob_canny_low: f32,
    pub blob_canny_high: f32,

    /// Watershed strategy: marker seeding threshold as a fraction of the
    /// distance-map maximum
    pub watershed_seed_fraction: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_area_ratio: 0.0002,
            max_area_ratio: 0.85,
            min_object_px: 8,
            min_circularity: 0.3,
            max_aspect_ratio: 3.0,
            brightness_offset: 25,
            brightness_floor: 180,
            adaptive_block_radius: 7,
            adaptive_offset: 8,
            blob_min_radius: 5,
            blob_max_radius: 50,
            blob_min_distance: 20,
            blob_accumulator_threshold: 30.0,
            blob_canny_low: 50.0,
            blob_canny_high: 150.0,
            watershed_seed_fraction: 0.4,
        }
    }
}

/// Duplicate-merging parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Intersection-over-minimum-area ratio above which two regions are duplicates
    pub overlap_threshold: f64,

    /// Overlap threshold applied to small objects, which alias more aggressively
    pub small_overlap_threshold: f64,

    /// Bounding-box area (px²) below which an object counts as small
    pub small_object_area: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.3,
            small_overlap_threshold: 0.1,
            small_object_area: 100.0,
        }
    }
}

/// Blur classification thresholds
///
/// Whole-image and per-object decisions intentionally use different rules
/// and different threshold sets: the whole-image mode is a weighted vote
/// across four signals, while a small ROI may fail on a single axis and
/// still be unusable, so the per-object mode is an OR gate over three.
/// Do not unify them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Whole-image: Laplacian variance threshold and vote weight
    pub image_laplacian_threshold: f64,
    pub image_laplacian_weight: f64,

    /// Whole-image: mean Sobel magnitude threshold and vote weight
    pub image_sobel_threshold: f64,
    pub image_sobel_weight: f64,

    /// Whole-image: edge density threshold and vote weight
    pub image_edge_density_threshold: f64,
    pub image_edge_density_weight: f64,

    /// Whole-image: pixel variance threshold and vote weight
    pub image_variance_threshold: f64,
    pub image_variance_weight: f64,

    /// Whole-image: weighted score above which the frame counts as blurred
    pub image_blur_score: f64,

    /// Per-object: Laplacian variance threshold
    pub object_laplacian_threshold: f64,

    /// Per-object: mean Sobel magnitude threshold
    pub object_sobel_threshold: f64,

    /// Per-object: pixel variance threshold
    pub object_variance_threshold: f64,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            image_laplacian_threshold: 50.0,
            image_laplacian_weight: 0.35,
            image_sobel_threshold: 15.0,
            image_sobel_weight: 0.25,
            image_edge_density_threshold: 0.05,
            image_edge_density_weight: 0.25,
            image_variance_threshold: 100.0,
            image_variance_weight: 0.15,
            image_blur_score: 0.5,
            object_laplacian_threshold: 100.0,
            object_sobel_threshold: 50.0,
            object_variance_threshold: 30.0,
        }
    }
}

/// Restoration parameters (PSF estimation + deconvolution)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Laplacian variance below which blur counts as severe (Richardson-Lucy)
    pub severe_laplacian: f64,

    /// Mean Sobel magnitude below which blur counts as moderate (Wiener)
    pub moderate_sobel: f64,

    /// Richardson-Lucy iteration count
    pub rl_iterations: u32,

    /// Noise-to-signal ratio clamp for the Wiener filter
    pub nsr_min: f64,
    pub nsr_max: f64,

    /// PSF kernel size bounds (odd, pixels)
    pub psf_min_size: u32,
    pub psf_max_size: u32,

    /// PSF Gaussian sigma bounds
    pub psf_sigma_min: f64,
    pub psf_sigma_max: f64,

    /// Unsharp masking parameters (mild blur and final fallback)
    pub unsharp_sigma: f32,
    pub unsharp_amount: f32,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            severe_laplacian: 50.0,
            moderate_sobel: 30.0,
            rl_iterations: 15,
            nsr_min: 0.001,
            nsr_max: 0.1,
            psf_min_size: 3,
            psf_max_size: 15,
            psf_sigma_min: 0.5,
            psf_sigma_max: 3.0,
            unsharp_sigma: 1.0,
            unsharp_amount: 1.5,
        }
    }
}

/// Post-restoration detail enhancement parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    /// Bilateral filter window radius
    pub bilateral_radius: u32,

    /// Bilateral filter range sigma (intensity units)
    pub bilateral_sigma_color: f64,

    /// Bilateral filter spatial sigma (pixels)
    pub bilateral_sigma_space: f64,

    /// CLAHE clip limit (multiple of the uniform histogram bin height)
    pub clahe_clip_limit: f64,

    /// CLAHE tile grid size (tiles per axis)
    pub clahe_tiles: u32,

    /// Tenengrad energy below which edge injection kicks in
    pub edge_inject_threshold: f64,

    /// Edge injection blend weights: base image and edge map
    pub edge_inject_base: f64,
    pub edge_inject_amount: f64,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            bilateral_radius: 2,
            bilateral_sigma_color: 50.0,
            bilateral_sigma_space: 50.0,
            clahe_clip_limit: 2.0,
            clahe_tiles: 4,
            edge_inject_threshold: 1000.0,
            edge_inject_base: 0.8,
            edge_inject_amount: 0.2,
        }
    }
}

// ============================================================
// Top-level config
// ============================================================

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detection: DetectionConfig,
    pub fusion: FusionConfig,
    pub classify: ClassifyConfig,
    pub restore: RestoreConfig,
    pub enhance: EnhanceConfig,

    /// Worker threads for batch processing (None = all cores)
    pub threads: Option<usize>,
}

impl PipelineConfig {
    /// Load config, searching `./grainscan.toml` then the user config dir
    pub fn load() -> Result<Self> {
        let local = Path::new("grainscan.toml");
        if local.exists() {
            return Self::load_from_path(local);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user = config_dir.join("grainscan/config.toml");
            if user.exists() {
                return Self::load_from_path(&user);
            }
        }

        Ok(Self::default())
    }

    /// Load config from an explicit TOML file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AnalysisError::ImageNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AnalysisError::InvalidImage(e.to_string()))
    }

    /// Merge CLI overrides into this config (CLI takes precedence)
    pub fn merge_with_cli(mut self, overrides: &CliOverrides) -> Self {
        if let Some(v) = overrides.object_laplacian_threshold {
            self.classify.object_laplacian_threshold = v;
        }
        if let Some(v) = overrides.object_sobel_threshold {
            self.classify.object_sobel_threshold = v;
        }
        if let Some(v) = overrides.object_variance_threshold {
            self.classify.object_variance_threshold = v;
        }
        if let Some(v) = overrides.overlap_threshold {
            self.fusion.overlap_threshold = v;
        }
        if let Some(v) = overrides.rl_iterations {
            self.restore.rl_iterations = v;
        }
        if overrides.threads.is_some() {
            self.threads = overrides.threads;
        }
        self
    }

    /// Serialize to JSON for report embedding
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Values the CLI may override on top of a config file
///
/// Fields are `None` unless the user explicitly set the corresponding flag,
/// so config-file values are not clobbered by clap defaults.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub object_laplacian_threshold: Option<f64>,
    pub object_sobel_threshold: Option<f64>,
    pub object_variance_threshold: Option<f64>,
    pub overlap_threshold: Option<f64>,
    pub rl_iterations: Option<u32>,
    pub threads: Option<usize>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Returns the default config file search locations, for display
pub fn config_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from("./grainscan.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        locations.push(config_dir.join("grainscan/config.toml"));
    }
    locations
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.restore.rl_iterations, 15);
        assert_eq!(config.classify.object_laplacian_threshold, 100.0);
        assert_eq!(config.fusion.overlap_threshold, 0.3);
        assert!(config.threads.is_none());
    }

    #[test]
    fn test_image_vote_weights_sum_to_one() {
        let c = ClassifyConfig::default();
        let sum = c.image_laplacian_weight
            + c.image_sobel_weight
            + c.image_edge_density_weight
            + c.image_variance_weight;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_with_cli() {
        let overrides = CliOverrides {
            object_laplacian_threshold: Some(80.0),
            rl_iterations: Some(20),
            threads: Some(2),
            ..Default::default()
        };

        let config = PipelineConfig::default().merge_with_cli(&overrides);
        assert_eq!(config.classify.object_laplacian_threshold, 80.0);
        assert_eq!(config.restore.rl_iterations, 20);
        assert_eq!(config.threads, Some(2));
        // Untouched fields keep their defaults
        assert_eq!(config.classify.object_sobel_threshold, 50.0);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PipelineConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: PipelineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            parsed.classify.object_variance_threshold,
            config.classify.object_variance_threshold
        );
    }

    #[test]
    fn test_partial_toml() {
        // Missing sections and fields fall back to defaults
        let parsed: PipelineConfig = toml::from_str(
            r#"
            [restore]
            rl_iterations = 5
            "#,
        )
        .unwrap();
        assert_eq!(parsed.restore.rl_iterations, 5);
        assert_eq!(parsed.restore.severe_laplacian, 50.0);
        assert_eq!(parsed.detection.min_object_px, 8);
    }

    #[test]
    fn test_load_missing_path() {
        let result = PipelineConfig::load_from_path(Path::new("/nonexistent/grainscan.toml"));
        assert!(matches!(result, Err(AnalysisError::ImageNotFound(_))));
    }

    #[test]
    fn test_to_json() {
        let json = PipelineConfig::default().to_json();
        assert!(json.contains("rl_iterations"));
    }
}
