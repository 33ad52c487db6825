//! Merging overlapping detections from different strategies
//!
//! Candidates are processed largest-area-first; a candidate whose bounding
//! box covers too much of an already-accepted region's box (intersection over
//! the smaller of the two box areas) is discarded as a duplicate. Small
//! objects use a lower threshold because touching small objects alias far
//! more aggressively than large ones.
//!
//! The result is deterministic: area ties are broken by strategy priority,
//! then by position.

use tracing::debug;

use crate::config::FusionConfig;

use super::types::Region;

/// Deduplicate candidate regions. Order of the input does not matter; the
/// output is sorted by area (largest first).
pub fn merge_duplicates(mut candidates: Vec<Region>, config: &FusionConfig) -> Vec<Region> {
    if candidates.is_empty() {
        return candidates;
    }

    candidates.sort_by(|a, b| {
        b.area
            .partial_cmp(&a.area)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.strategy.priority().cmp(&b.strategy.priority()))
            .then(a.y.cmp(&b.y))
            .then(a.x.cmp(&b.x))
    });

    let raw = candidates.len();
    let mut accepted: Vec<Region> = Vec::new();

    for candidate in candidates {
        let threshold = if candidate.area < config.small_object_area {
            config.small_overlap_threshold
        } else {
            config.overlap_threshold
        };

        let duplicate = accepted.iter().any(|existing| {
            let intersection = candidate.intersection_area(existing);
            if intersection <= 0.0 {
                return false;
            }
            let smaller = candidate.bbox_area().min(existing.bbox_area());
            intersection / smaller > threshold
        });

        if !duplicate {
            accepted.push(candidate);
        }
    }

    debug!(raw, merged = accepted.len(), "fusion: deduplicated candidates");
    accepted
}

// ============================================================
// Tests
// ============================================================
