//! Common error types for the analysis pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Analysis error types
///
/// These only surface at the I/O boundary (loading or saving images). The
/// core pipeline itself never fails: degenerate input produces an empty
/// result with a failed status, and numerical problems inside individual
/// stages are absorbed by sentinels or method fallbacks.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Image not found: {0}")]
    ImageNotFound(PathBuf),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
