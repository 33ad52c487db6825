//! End-to-end analysis pipeline
//!
//! Orchestrates the full flow for one frame: whole-image pre-gate metrics,
//! candidate detection and fusion, per-object blur classification,
//! restoration of blurred regions, recomposition, shape classification, and
//! annotated rendering.
//!
//! The pipeline never fails: a degenerate input yields an empty result with
//! a failed status, and every numerical problem inside a stage is absorbed
//! there. Each invocation is independent; nothing is shared across frames.

use image::{GrayImage, RgbImage};
use serde::Serialize;
use tracing::debug;

use crate::classify::{BlurClassifier, ImageBlurReport, ObjectBlurProfile};
use crate::config::PipelineConfig;
use crate::detect::{self, DetectionSet, Region};
use crate::render::Renderer;
use crate::restore::{self, RestorationMethod};
use crate::shape::ShapeClassifier;

/// Outcome status of one pipeline invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// Analysis ran to completion (an empty object set is still Ok)
    Ok,

    /// Input was unusable; the result carries an empty object set
    Failed,
}

/// One analyzed object: region, focus profile, shape, and (if restored)
/// the restoration outcome
#[derive(Debug, Clone)]
pub struct AnalyzedObject {
    /// 1-based display ID, dense over the final object set
    pub id: u32,
    pub region: Region,
    pub profile: ObjectBlurProfile,
    pub shape: String,
    pub restoration_method: Option<RestorationMethod>,
    pub quality_improvement: Option<f64>,
}

/// Complete result of one pipeline invocation
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub status: AnalysisStatus,

    /// Human-readable summary of what happened
    pub message: String,

    /// Whole-image pre-gate verdict
    pub image_report: ImageBlurReport,

    /// Fused regions with provenance count
    pub detection: DetectionSet,

    /// Final objects, renumbered 1..N
    pub objects: Vec<AnalyzedObject>,

    /// Input frame with blurred ROIs replaced by restored pixels
    pub restored_image: RgbImage,

    /// Restored frame with the annotation overlay
    pub annotated_image: RgbImage,

    /// How many objects were classified blurred
    pub blurred_count: usize,

    /// Mean quality improvement over restored objects, percent
    pub average_improvement: f64,
}

/// Cheap analysis summary without restoration
#[derive(Debug, Clone, Serialize)]
pub struct BlurAnalysis {
    pub total_objects: usize,
    pub blurred_objects: usize,

    /// Mean blur severity over blurred objects, in [0, 1]
    pub average_severity: f64,

    pub has_blur: bool,
}

impl BlurAnalysis {
    pub fn blur_percentage(&self) -> f64 {
        if self.total_objects == 0 {
            return 0.0;
        }
        self.blurred_objects as f64 / self.total_objects as f64 * 100.0
    }
}

/// The analysis pipeline for photographs of scattered small objects
pub struct ScatterPipeline {
    config: PipelineConfig,
}

impl ScatterPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the complete pipeline on one decoded RGB frame.
    ///
    /// The caller is responsible for providing the frame in canonical
    /// upright orientation; no EXIF or file handling happens here.
    pub fn process(&self, image: &RgbImage) -> PipelineOutcome {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Self::failed_outcome(image, "analysis failed: empty input buffer");
        }

        let gray = image::imageops::grayscale(image);

        let image_report = BlurClassifier::classify_image(&gray, &self.config.classify);
        debug!(
            blurred = image_report.is_blurred,
            score = image_report.blur_score,
            "whole-image pre-gate"
        );

        let detection =
            detect::detect_objects(&gray, &self.config.detection, &self.config.fusion);
        debug!(
            objects = detection.len(),
            raw = detection.raw_candidates,
            "detection complete"
        );

        let mut restored_image = image.clone();
        let mut objects = Vec::with_capacity(detection.len());
        let mut blurred_count = 0usize;
        let mut improvement_sum = 0.0f64;

        for (index, region) in detection.regions.iter().enumerate() {
            let id = index as u32 + 1;

            let (gray_roi, color_roi) = crop_roi(&gray, image, region);
            let profile = BlurClassifier::classify_object(&gray_roi, &self.config.classify);

            let (restoration_method, quality_improvement) = if profile.is_blurred {
                blurred_count += 1;

                let result = restore::restore_region(
                    &color_roi,
                    &gray_roi,
                    region.area,
                    &profile,
                    &self.config.restore,
                    &self.config.enhance,
                );
                paste_roi(&mut restored_image, &result.restored, region);
                improvement_sum += result.quality_improvement;

                (Some(result.method), Some(result.quality_improvement))
            } else {
                (None, None)
            };

            let shape = ShapeClassifier::classify(region);

            objects.push(AnalyzedObject {
                id,
                region: region.clone(),
                profile,
                shape,
                restoration_method,
                quality_improvement,
            });
        }

        let mut annotated_image = restored_image.clone();
        Renderer::draw_annotations(&mut annotated_image, &detection.regions);

        let average_improvement = if blurred_count > 0 {
            improvement_sum / blurred_count as f64
        } else {
            0.0
        };

        let message = if detection.is_empty() {
            "no objects detected".to_string()
        } else if blurred_count == 0 {
            format!(
                "no blurred objects among {} detected; image is ready",
                detection.len()
            )
        } else {
            format!(
                "restored {} of {} objects, average quality improvement {:.1}%",
                blurred_count,
                detection.len(),
                average_improvement
            )
        };

        PipelineOutcome {
            status: AnalysisStatus::Ok,
            message,
            image_report,
            detection,
            objects,
            restored_image,
            annotated_image,
            blurred_count,
            average_improvement,
        }
    }

    /// Whole-image mode only: the capture-gating pre-check, without the
    /// per-object path
    pub fn check_image(&self, image: &RgbImage) -> ImageBlurReport {
        let gray = image::imageops::grayscale(image);
        BlurClassifier::classify_image(&gray, &self.config.classify)
    }

    /// Detection and classification without restoration or rendering
    pub fn analyze_blur(&self, image: &RgbImage) -> BlurAnalysis {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return BlurAnalysis {
                total_objects: 0,
                blurred_objects: 0,
                average_severity: 0.0,
                has_blur: false,
            };
        }

        let gray = image::imageops::grayscale(image);
        let detection =
            detect::detect_objects(&gray, &self.config.detection, &self.config.fusion);

        let mut blurred_objects = 0usize;
        let mut severity_sum = 0.0f64;

        for region in &detection.regions {
            let (gray_roi, _) = crop_roi(&gray, image, region);
            let profile = BlurClassifier::classify_object(&gray_roi, &self.config.classify);

            if profile.is_blurred {
                blurred_objects += 1;
                severity_sum += ((100.0 - profile.laplacian_variance) / 100.0).max(0.0);
            }
        }

        BlurAnalysis {
            total_objects: detection.len(),
            blurred_objects,
            average_severity: if blurred_objects > 0 {
                severity_sum / blurred_objects as f64
            } else {
                0.0
            },
            has_blur: blurred_objects > 0,
        }
    }

    /// Quick boolean gate over the per-object path
    pub fn has_blurred_objects(&self, image: &RgbImage) -> bool {
        self.analyze_blur(image).has_blur
    }

    fn failed_outcome(image: &RgbImage, message: &str) -> PipelineOutcome {
        let empty_report = ImageBlurReport {
            laplacian_variance: 0.0,
            sobel_mean_magnitude: 0.0,
            edge_density: 0.0,
            pixel_variance: 0.0,
            blur_score: 1.0,
            is_blurred: true,
            description: "Analysis failed".to_string(),
        };

        PipelineOutcome {
            status: AnalysisStatus::Failed,
            message: message.to_string(),
            image_report: empty_report,
            detection: DetectionSet::default(),
            objects: Vec::new(),
            restored_image: image.clone(),
            annotated_image: image.clone(),
            blurred_count: 0,
            average_improvement: 0.0,
        }
    }
}

/// Crop a region's bounding box out of the gray and color frames, clamped to
/// the image bounds
fn crop_roi(gray: &GrayImage, color: &RgbImage, region: &Region) -> (GrayImage, RgbImage) {
    let (width, height) = color.dimensions();
    let x = region.x.min(width.saturating_sub(1));
    let y = region.y.min(height.saturating_sub(1));
    let w = region.width.min(width - x).max(1);
    let h = region.height.min(height - y).max(1);

    (
        image::imageops::crop_imm(gray, x, y, w, h).to_image(),
        image::imageops::crop_imm(color, x, y, w, h).to_image(),
    )
}

/// Write restored ROI pixels back into the full frame
fn paste_roi(canvas: &mut RgbImage, roi: &RgbImage, region: &Region) {
    let (width, height) = canvas.dimensions();
    for (dy, row) in roi.rows().enumerate() {
        for (dx, pixel) in row.enumerate() {
            let x = region.x + dx as u32;
            let y = region.y + dy as u32;
            if x < width && y < height {
                canvas.put_pixel(x, y, *pixel);
            }
        }
    }
}

// ============================================================
// Reports
// ============================================================

/// Serializable analysis report for one frame
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub status: AnalysisStatus,
    pub message: String,
    pub image: ImageMetricsReport,
    pub object_count: usize,
    pub blurred_count: usize,
    pub raw_candidates: usize,
    pub average_improvement: f64,
    pub objects: Vec<ObjectReport>,
}

/// Whole-image metrics in report form
#[derive(Debug, Clone, Serialize)]
pub struct ImageMetricsReport {
    pub laplacian_variance: f64,
    pub sobel_mean_magnitude: f64,
    pub edge_density: f64,
    pub pixel_variance: f64,
    pub blur_score: f64,
    pub is_blurred: bool,
    pub description: String,
}

/// One object in report form
#[derive(Debug, Clone, Serialize)]
pub struct ObjectReport {
    pub id: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub strategy: &'static str,
    pub shape: String,
    pub area: f64,
    pub perimeter: f64,
    pub roundness: f64,
    pub aspect_ratio: f64,
    pub laplacian_variance: f64,
    pub sobel_magnitude: f64,
    pub pixel_variance: f64,
    pub tenengrad: f64,
    pub blurred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restoration_method: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_improvement: Option<f64>,
}

impl PipelineOutcome {
    /// Build the serializable report for this outcome
    pub fn to_report(&self) -> AnalysisReport {
        AnalysisReport {
            status: self.status,
            message: self.message.clone(),
            image: ImageMetricsReport {
                laplacian_variance: self.image_report.laplacian_variance,
                sobel_mean_magnitude: self.image_report.sobel_mean_magnitude,
                edge_density: self.image_report.edge_density,
                pixel_variance: self.image_report.pixel_variance,
                blur_score: self.image_report.blur_score,
                is_blurred: self.image_report.is_blurred,
                description: self.image_report.description.clone(),
            },
            object_count: self.objects.len(),
            blurred_count: self.blurred_count,
            raw_candidates: self.detection.raw_candidates,
            average_improvement: self.average_improvement,
            objects: self
                .objects
                .iter()
                .map(|obj| ObjectReport {
                    id: obj.id,
                    x: obj.region.x,
                    y: obj.region.y,
                    width: obj.region.width,
                    height: obj.region.height,
                    strategy: obj.region.strategy.as_str(),
                    shape: obj.shape.clone(),
                    area: obj.region.area,
                    perimeter: obj.region.perimeter,
                    roundness: obj.region.circularity,
                    aspect_ratio: obj.region.aspect_ratio,
                    laplacian_variance: obj.profile.laplacian_variance,
                    sobel_magnitude: obj.profile.sobel_magnitude,
                    pixel_variance: obj.profile.pixel_variance,
                    tenengrad: obj.profile.tenengrad,
                    blurred: obj.profile.is_blurred,
                    restoration_method: obj.restoration_method.map(|m| m.as_str()),
                    quality_improvement: obj.quality_improvement,
                })
                .collect(),
        }
    }
}

// ============================================================
// Tests
// ============================================================
