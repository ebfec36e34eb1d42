/// Single-pass YOLO plant detector using the cached detection model.
///
/// Handles letterbox preprocessing, output parsing in either orientation and
/// NMS. Tiling is layered on top by `TiledDetector`.
use std::sync::Arc;

use crate::detection::domain::object_detector::ObjectDetector;
use crate::inference::domain::inference_model::ModelKind;
use crate::inference::infrastructure::letterbox::{align_to_stride, letterbox};
use crate::inference::infrastructure::yolo_output::{nms, parse_candidates};
use crate::inference::resource_cache::ResourceCache;
use crate::shared::detection::Detection;
use crate::shared::error::{InferenceError, StageError};
use crate::shared::frame::Frame;

pub struct YoloDetector {
    cache: Arc<ResourceCache>,
    class_names: Vec<String>,
    /// Used when the model input is dynamic; normally the tile size.
    fallback_input_size: u32,
    nms_iou: f64,
}

impl YoloDetector {
    pub fn new(
        cache: Arc<ResourceCache>,
        class_names: Vec<String>,
        fallback_input_size: u32,
        nms_iou: f64,
    ) -> Self {
        Self {
            cache,
            class_names,
            fallback_input_size: align_to_stride(fallback_input_size),
            nms_iou,
        }
    }
}

impl ObjectDetector for YoloDetector {
    fn detect(
        &self,
        image: &Frame,
        slot: usize,
        confidence: f64,
    ) -> Result<Vec<Detection>, StageError> {
        if image.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.cache.acquire(ModelKind::Detection, slot)?;
        let input_size = model.input_size().unwrap_or(self.fallback_input_size);
        let (tensor, transform) = letterbox(image, input_size);

        let outputs = model.run(tensor)?;
        let head = outputs
            .first()
            .ok_or_else(|| InferenceError::UnexpectedOutput("no detection output".into()))?;

        let candidates = parse_candidates(
            head,
            0,
            confidence,
            &transform,
            (image.width(), image.height()),
        )?;

        Ok(nms(candidates, self.nms_iou)
            .into_iter()
            .map(|c| {
                let label = self
                    .class_names
                    .get(c.class_id)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{}", c.class_id));
                Detection::from_corners(c.bbox, c.confidence, label)
            })
            .collect())
    }
}
