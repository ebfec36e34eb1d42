use std::sync::Arc;
use std::time::Instant;

use crate::detection::domain::object_detector::ObjectDetector;
use crate::estimation::band_estimator::{BandEstimate, BandEstimator};
use crate::orchestration::domain::job::ImageDescriptor;
use crate::orchestration::domain::unit_runner::UnitRunner;
use crate::pipeline::domain::image_source::ImageSource;
use crate::pipeline::domain::work_unit_result::WorkUnitResult;
use crate::segmentation::domain::segmenter::Segmenter;
use crate::shared::config::SegmentationConfig;
use crate::shared::detection::Detection;
use crate::shared::error::{StageError, UnitError};
use crate::shared::frame::Frame;
use crate::shared::mask::rasterize_polygon;
use crate::shared::segment_region::SegmentRegion;

/// Per-image counting pipeline: segment → (crop → detect → estimate) per
/// container.
///
/// Only the segmentation call can fail the whole image. A container that
/// fails later is logged and skipped so the remaining containers still count.
pub struct PipelineCoordinator {
    segmenter: Arc<dyn Segmenter>,
    detector: Arc<dyn ObjectDetector>,
    estimator: BandEstimator,
    images: Arc<dyn ImageSource>,
    segmentation: SegmentationConfig,
    detection_confidence: f64,
}

impl PipelineCoordinator {
    pub fn new(
        segmenter: Arc<dyn Segmenter>,
        detector: Arc<dyn ObjectDetector>,
        estimator: BandEstimator,
        images: Arc<dyn ImageSource>,
        segmentation: SegmentationConfig,
        detection_confidence: f64,
    ) -> Self {
        Self {
            segmenter,
            detector,
            estimator,
            images,
            segmentation,
            detection_confidence,
        }
    }

    /// Count plants in one decoded photo.
    ///
    /// Detections and band rows in the result are in full-image pixels.
    pub fn run(
        &self,
        image: &Frame,
        slot: usize,
        seg_threshold: f64,
        det_threshold: f64,
    ) -> Result<WorkUnitResult, StageError> {
        let start = Instant::now();
        let params = SegmentationConfig {
            confidence: seg_threshold,
            ..self.segmentation.clone()
        };
        let regions = self.segmenter.segment(image, slot, &params)?;
        if regions.is_empty() {
            log::info!("No containers found; reporting zero counts");
            return Ok(WorkUnitResult::empty(start.elapsed().as_secs_f64()));
        }

        let mut detections = Vec::new();
        let mut band_estimates = Vec::new();
        let mut processed = 0usize;

        for (i, region) in regions.iter().enumerate() {
            match self.process_segment(image, region, slot, det_threshold) {
                Ok((dets, bands)) => {
                    log::debug!(
                        "Segment {} ({}): {} detection(s), {} estimated",
                        i + 1,
                        region.container_type,
                        dets.len(),
                        bands.iter().map(|b| b.estimated_count).sum::<u64>()
                    );
                    detections.extend(dets);
                    band_estimates.extend(bands);
                    processed += 1;
                }
                Err(e) => {
                    log::warn!(
                        "Skipping segment {} ({}): {e}",
                        i + 1,
                        region.container_type
                    );
                }
            }
        }

        let result = WorkUnitResult::from_parts(
            detections,
            band_estimates,
            processed,
            start.elapsed().as_secs_f64(),
        );
        log::info!(
            "Processed {processed}/{} segment(s): {} detected, {} estimated in {:.2}s",
            regions.len(),
            result.total_detected,
            result.total_estimated,
            result.elapsed_seconds
        );
        Ok(result)
    }

    fn process_segment(
        &self,
        image: &Frame,
        region: &SegmentRegion,
        slot: usize,
        det_threshold: f64,
    ) -> Result<(Vec<Detection>, Vec<BandEstimate>), StageError> {
        let (iw, ih) = (image.width(), image.height());
        let (x, y, w, h) = region.pixel_bounds(iw, ih);
        let crop = image.crop(x, y, w, h);
        let polygon = region.polygon_in_pixels(iw, ih, x, y);
        let mask = rasterize_polygon(&polygon, crop.width() as usize, crop.height() as usize)?;

        // keep detections centred inside the container outline
        let detections: Vec<Detection> = self
            .detector
            .detect(&crop, slot, det_threshold)?
            .into_iter()
            .filter(|d| {
                let (col, row) = (d.center_x as usize, d.center_y as usize);
                mask.get((row, col)).is_some_and(|&v| v != 0)
            })
            .collect();

        let mut bands =
            self.estimator
                .estimate(&detections, &mask.view(), &crop, &region.container_type)?;
        for band in &mut bands {
            band.y_start += y as usize;
            band.y_end += y as usize;
        }

        let detections = detections
            .into_iter()
            .map(|d| d.translated(x as f64, y as f64))
            .collect();
        Ok((detections, bands))
    }
}

impl UnitRunner for PipelineCoordinator {
    fn run(&self, image: &ImageDescriptor, slot: usize) -> Result<WorkUnitResult, UnitError> {
        log::info!(
            "Processing image {} on slot {slot}",
            image.external_image_id
        );
        let frame = self
            .images
            .read(&image.readable_locator)
            .map_err(StageError::from)?;
        let result = PipelineCoordinator::run(
            self,
            &frame,
            slot,
            self.segmentation.confidence,
            self.detection_confidence,
        )?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::config::EstimationConfig;
    use crate::shared::error::{ImageReadError, InferenceError};
    use crate::shared::segment_region::ContainerType;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    struct StubSegmenter {
        regions: Result<Vec<SegmentRegion>, StageError>,
    }

    impl Segmenter for StubSegmenter {
        fn segment(
            &self,
            _image: &Frame,
            _slot: usize,
            params: &SegmentationConfig,
        ) -> Result<Vec<SegmentRegion>, StageError> {
            let regions = self.regions.clone()?;
            Ok(regions
                .into_iter()
                .filter(|r| r.confidence >= params.confidence)
                .collect())
        }
    }

    /// Two plants per crop at fixed crop coordinates; fails on crops of a
    /// poisoned width.
    struct StubDetector {
        fail_on_width: Option<u32>,
    }

    impl ObjectDetector for StubDetector {
        fn detect(
            &self,
            image: &Frame,
            _slot: usize,
            confidence: f64,
        ) -> Result<Vec<Detection>, StageError> {
            if Some(image.width()) == self.fail_on_width {
                return Err(InferenceError::Runtime("device lost".into()).into());
            }
            Ok(vec![
                Detection::from_corners([3.0, 3.0, 7.0, 7.0], 0.8, "plant"),
                Detection::from_corners([13.0, 3.0, 17.0, 7.0], 0.6, "plant"),
            ]
            .into_iter()
            .filter(|d| d.confidence >= confidence)
            .collect())
        }
    }

    struct StubImages {
        frames: HashMap<String, Frame>,
    }

    impl ImageSource for StubImages {
        fn read(&self, locator: &str) -> Result<Frame, ImageReadError> {
            self.frames
                .get(locator)
                .cloned()
                .ok_or_else(|| ImageReadError::NotFound(locator.to_string()))
        }
    }

    fn leaf_image() -> Frame {
        Frame::new([90u8, 200, 80].repeat(100 * 100), 100, 100).unwrap()
    }

    fn region(bbox: [f64; 4], container_type: ContainerType) -> SegmentRegion {
        let polygon = vec![
            (bbox[0], bbox[1]),
            (bbox[2], bbox[1]),
            (bbox[2], bbox[3]),
            (bbox[0], bbox[3]),
        ];
        SegmentRegion::new(container_type, 0.9, bbox, polygon, 100, 100).unwrap()
    }

    fn coordinator(
        regions: Result<Vec<SegmentRegion>, StageError>,
        fail_on_width: Option<u32>,
    ) -> PipelineCoordinator {
        let mut frames = HashMap::new();
        frames.insert("img-1".to_string(), leaf_image());
        PipelineCoordinator::new(
            Arc::new(StubSegmenter { regions }),
            Arc::new(StubDetector { fail_on_width }),
            BandEstimator::new(EstimationConfig::default()),
            Arc::new(StubImages { frames }),
            SegmentationConfig::default(),
            0.25,
        )
    }

    fn descriptor(locator: &str) -> ImageDescriptor {
        ImageDescriptor {
            external_image_id: "ext-1".into(),
            readable_locator: locator.into(),
            spatial_context_id: "bed-7".into(),
        }
    }

    #[test]
    fn test_zero_segments_is_all_zero_success() {
        let result = coordinator(Ok(Vec::new()), None)
            .run(&leaf_image(), 0, 0.5, 0.25)
            .unwrap();

        assert_eq!(result.total_detected, 0);
        assert_eq!(result.total_estimated, 0);
        assert_eq!(result.segments_processed, 0);
        assert_relative_eq!(result.avg_confidence, 0.0);
        assert!(result.detections.is_empty());
    }

    #[test]
    fn test_detections_are_mapped_to_full_image() {
        let result = coordinator(Ok(vec![region([0.2, 0.4, 0.6, 0.8], ContainerType::Box)]), None)
            .run(&leaf_image(), 0, 0.5, 0.25)
            .unwrap();

        assert_eq!(result.segments_processed, 1);
        assert_eq!(result.total_detected, 2);
        assert_eq!(result.detections[0].bbox(), [23.0, 43.0, 27.0, 47.0]);
        assert_relative_eq!(result.avg_confidence, 0.7, epsilon = 1e-12);
        assert_eq!(result.band_estimates.len(), 4);
        assert_eq!(result.band_estimates[0].y_start, 40);
        assert_eq!(result.band_estimates[3].y_end, 80);
        assert_eq!(
            result.total_estimated,
            result
                .band_estimates
                .iter()
                .map(|b| b.estimated_count)
                .sum::<u64>()
        );
    }

    #[test]
    fn test_failing_segment_is_skipped() {
        // second crop is 30 px wide and poisons the detector
        let regions = vec![
            region([0.0, 0.0, 0.5, 0.5], ContainerType::Plug),
            region([0.6, 0.6, 0.9, 0.9], ContainerType::Box),
        ];

        let result = coordinator(Ok(regions), Some(30))
            .run(&leaf_image(), 0, 0.5, 0.25)
            .unwrap();

        assert_eq!(result.segments_processed, 1);
        assert_eq!(result.total_detected, 2);
        assert!(result
            .band_estimates
            .iter()
            .all(|b| b.container_type == ContainerType::Plug));
    }

    #[test]
    fn test_detection_threshold_is_applied() {
        let result = coordinator(Ok(vec![region([0.0, 0.0, 0.5, 0.5], ContainerType::Plug)]), None)
            .run(&leaf_image(), 0, 0.5, 0.7)
            .unwrap();
        assert_eq!(result.total_detected, 1);
        assert!(result.detections.iter().all(|d| d.confidence >= 0.7));
    }

    #[test]
    fn test_segmentation_failure_fails_the_unit() {
        let err = coordinator(Err(InferenceError::Runtime("oom".into()).into()), None)
            .run(&leaf_image(), 0, 0.5, 0.25)
            .unwrap_err();
        assert!(matches!(err, StageError::Inference(_)));
    }

    #[test]
    fn test_unit_runner_reads_image_by_locator() {
        let c = coordinator(Ok(vec![region([0.0, 0.0, 0.5, 0.5], ContainerType::Plug)]), None);
        let result = UnitRunner::run(&c, &descriptor("img-1"), 0).unwrap();
        assert_eq!(result.total_detected, 2);
    }

    #[test]
    fn test_unit_runner_missing_image_is_missing_input() {
        let c = coordinator(Ok(Vec::new()), None);
        let err = UnitRunner::run(&c, &descriptor("nope"), 0).unwrap_err();
        assert!(matches!(err, UnitError::MissingInput(ref l) if l == "nope"));
        assert!(!err.is_retryable());
    }
}
