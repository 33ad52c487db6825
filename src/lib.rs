//! grainscan - blur-aware inspection of scattered small objects
//!
//! Takes a still photograph of a scattering of small discrete objects
//! (grains, beans, seeds, small parts) and produces:
//!
//! - a per-region focus verdict with restoration of blurred regions
//!   (PSF estimation, Richardson-Lucy / Wiener deconvolution, unsharp
//!   masking, detail enhancement), and
//! - a final set of separated objects, classified by shape and size,
//!   rendered as an annotated overlay and counted.
//!
//! No learned models are involved; detection and restoration are classical
//! signal processing. Regions defocused beyond recoverable SNR are left
//! alone rather than hallucinated: restoration is best-effort and reports a
//! zero quality improvement when it cannot help.
//!
//! # Example
//!
//! ```no_run
//! use grainscan::{PipelineConfig, ScatterPipeline};
//!
//! let image = image::open("beans.jpg").unwrap().to_rgb8();
//! let pipeline = ScatterPipeline::new(PipelineConfig::default());
//! let outcome = pipeline.process(&image);
//!
//! println!("{}", outcome.message);
//! for object in &outcome.objects {
//!     println!("#{} {} blurred={}", object.id, object.shape, object.profile.is_blurred);
//! }
//! ```

pub mod classify;
pub mod config;
pub mod detect;
pub mod filters;
pub mod metrics;
pub mod pipeline;
pub mod render;
pub mod restore;
pub mod shape;
pub mod types;

pub use classify::{BlurClassifier, ImageBlurReport, ObjectBlurProfile};
pub use config::{CliOverrides, PipelineConfig};
pub use detect::{DetectionSet, Region, StrategyKind};
pub use pipeline::{
    AnalysisReport, AnalysisStatus, AnalyzedObject, BlurAnalysis, PipelineOutcome,
    ScatterPipeline,
};
pub use restore::{RestorationMethod, RestorationResult};
pub use types::AnalysisError;

/// Process exit codes for the CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INPUT_NOT_FOUND: i32 = 2;
    /// `check` verdict: the image is too blurred to use
    pub const IMAGE_BLURRED: i32 = 3;
}
