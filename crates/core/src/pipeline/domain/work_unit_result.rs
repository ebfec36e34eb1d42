use serde::{Deserialize, Serialize};

use crate::estimation::band_estimator::BandEstimate;
use crate::shared::detection::Detection;

/// Everything produced for one image. Detections are in full-image pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnitResult {
    pub total_detected: u64,
    pub total_estimated: u64,
    pub segments_processed: usize,
    /// Mean detection confidence, 0.0 when nothing was detected.
    pub avg_confidence: f64,
    pub detections: Vec<Detection>,
    pub band_estimates: Vec<BandEstimate>,
    pub elapsed_seconds: f64,
}

impl WorkUnitResult {
    /// Result for an image with no containers.
    pub fn empty(elapsed_seconds: f64) -> Self {
        Self {
            total_detected: 0,
            total_estimated: 0,
            segments_processed: 0,
            avg_confidence: 0.0,
            detections: Vec::new(),
            band_estimates: Vec::new(),
            elapsed_seconds,
        }
    }

    /// Assemble a result, deriving totals from the records.
    pub fn from_parts(
        detections: Vec<Detection>,
        band_estimates: Vec<BandEstimate>,
        segments_processed: usize,
        elapsed_seconds: f64,
    ) -> Self {
        let avg_confidence = if detections.is_empty() {
            0.0
        } else {
            detections.iter().map(|d| d.confidence).sum::<f64>() / detections.len() as f64
        };
        Self {
            total_detected: detections.len() as u64,
            total_estimated: band_estimates.iter().map(|b| b.estimated_count).sum(),
            segments_processed,
            avg_confidence,
            detections,
            band_estimates,
            elapsed_seconds,
        }
    }
}
