use crate::shared::config::SegmentationConfig;
use crate::shared::error::StageError;
use crate::shared::frame::Frame;
use crate::shared::segment_region::SegmentRegion;

/// Domain interface for container segmentation over a whole photo.
///
/// Returns regions sorted by confidence, highest first. An empty result is
/// a normal outcome.
pub trait Segmenter: Send + Sync {
    fn segment(
        &self,
        image: &Frame,
        slot: usize,
        params: &SegmentationConfig,
    ) -> Result<Vec<SegmentRegion>, StageError>;
}
