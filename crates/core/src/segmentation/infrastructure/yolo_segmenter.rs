/// YOLO instance segmentation over a full photo.
///
/// Letterboxes the photo, runs the cached segmentation model for the worker
/// slot, applies NMS, decodes each instance mask from the prototype output and
/// reduces it to a convex polygon. Raw class names are remapped to canonical
/// container types.
use std::sync::Arc;

use crate::inference::domain::inference_model::{InferenceModel, ModelKind};
use crate::inference::infrastructure::letterbox::{align_to_stride, letterbox, Letterbox};
use crate::inference::infrastructure::yolo_output::{mask_points, nms, parse_candidates, Candidate};
use crate::inference::resource_cache::ResourceCache;
use crate::segmentation::domain::segmenter::Segmenter;
use crate::shared::config::SegmentationConfig;
use crate::shared::error::{InferenceError, StageError, ValidationError};
use crate::shared::frame::Frame;
use crate::shared::math::convex_hull;
use crate::shared::segment_region::{ContainerType, SegmentRegion};

pub struct YoloSegmenter {
    cache: Arc<ResourceCache>,
    class_names: Vec<String>,
}

impl YoloSegmenter {
    pub fn new(cache: Arc<ResourceCache>, class_names: Vec<String>) -> Self {
        Self { cache, class_names }
    }

    fn label_for(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }

    /// Static model input wins; otherwise the configured size, aligned to
    /// the 32 px stride.
    fn resolve_input_size(model: &dyn InferenceModel, requested: u32) -> u32 {
        if let Some(size) = model.input_size() {
            return size;
        }
        let aligned = align_to_stride(requested);
        if aligned != requested {
            log::warn!(
                "Segmentation inference size {requested} is not a multiple of 32, using {aligned}"
            );
        }
        aligned
    }

    fn build_region(
        &self,
        candidate: &Candidate,
        protos: Option<&ndarray::ArrayD<f32>>,
        transform: &Letterbox,
        input_size: u32,
        image: &Frame,
    ) -> Result<SegmentRegion, StageError> {
        let (w, h) = (image.width() as f64, image.height() as f64);

        let points = match protos {
            Some(protos) => mask_points(protos, candidate, transform, input_size)?,
            None => Vec::new(),
        };
        let hull = convex_hull(&points);
        let outline = if hull.len() >= 3 {
            hull
        } else {
            let [x1, y1, x2, y2] = candidate.bbox;
            vec![(x1, y1), (x2, y1), (x2, y2), (x1, y2)]
        };

        let polygon = outline.into_iter().map(|(x, y)| (x / w, y / h)).collect();
        let bbox = [
            candidate.bbox[0] / w,
            candidate.bbox[1] / h,
            candidate.bbox[2] / w,
            candidate.bbox[3] / h,
        ];
        let container_type = ContainerType::from_label(&self.label_for(candidate.class_id));

        Ok(SegmentRegion::new(
            container_type,
            candidate.confidence,
            bbox,
            polygon,
            image.width(),
            image.height(),
        )?)
    }
}

impl Segmenter for YoloSegmenter {
    fn segment(
        &self,
        image: &Frame,
        slot: usize,
        params: &SegmentationConfig,
    ) -> Result<Vec<SegmentRegion>, StageError> {
        if image.is_empty() {
            return Err(ValidationError("cannot segment an empty image".into()).into());
        }

        let model = self.cache.acquire(ModelKind::Segmentation, slot)?;
        let input_size = Self::resolve_input_size(model.as_ref(), params.inference_size);
        let (tensor, transform) = letterbox(image, input_size);

        let outputs = model.run(tensor)?;
        let detections = outputs
            .first()
            .ok_or_else(|| InferenceError::UnexpectedOutput("no detection output".into()))?;
        let protos = outputs.get(1);
        let num_mask_coeffs = protos.and_then(|p| p.shape().get(1).copied()).unwrap_or(0);

        let candidates = parse_candidates(
            detections,
            num_mask_coeffs,
            params.confidence,
            &transform,
            (image.width(), image.height()),
        )?;
        let candidates = nms(candidates, params.iou_threshold);

        let mut regions = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            match self.build_region(candidate, protos, &transform, input_size, image) {
                Ok(region) => regions.push(region),
                Err(StageError::Validation(e)) => {
                    log::warn!("Dropping degenerate segment candidate: {e}");
                }
                Err(e) => return Err(e),
            }
        }

        regions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        log::debug!("Segmented {} container region(s)", regions.len());
        Ok(regions)
    }
}
