use crate::shared::detection::Detection;
use crate::shared::error::StageError;
use crate::shared::frame::Frame;

/// Domain interface for plant detection over one image or crop.
///
/// Coordinates are pixels of `image`. Every returned detection has
/// confidence ≥ `confidence`.
pub trait ObjectDetector: Send + Sync {
    fn detect(
        &self,
        image: &Frame,
        slot: usize,
        confidence: f64,
    ) -> Result<Vec<Detection>, StageError>;
}
