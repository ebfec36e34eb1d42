use serde::{Deserialize, Serialize};

use crate::shared::math::{bbox_ios, bbox_iou, BBox};

/// One detected plant, center-based in pixel coordinates of the image it was
/// detected in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
    pub class_label: String,
}

impl Detection {
    pub fn from_corners(bbox: BBox, confidence: f64, class_label: impl Into<String>) -> Self {
        Self {
            center_x: ((bbox[0] + bbox[2]) / 2.0).max(0.0),
            center_y: ((bbox[1] + bbox[3]) / 2.0).max(0.0),
            width: bbox[2] - bbox[0],
            height: bbox[3] - bbox[1],
            confidence: confidence.clamp(0.0, 1.0),
            class_label: class_label.into(),
        }
    }

    pub fn bbox(&self) -> BBox {
        [
            self.center_x - self.width / 2.0,
            self.center_y - self.height / 2.0,
            self.center_x + self.width / 2.0,
            self.center_y + self.height / 2.0,
        ]
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn iou(&self, other: &Detection) -> f64 {
        bbox_iou(&self.bbox(), &other.bbox())
    }

    pub fn ios(&self, other: &Detection) -> f64 {
        bbox_ios(&self.bbox(), &other.bbox())
    }

    /// The same detection shifted by `(dx, dy)`, e.g. from tile or crop
    /// coordinates into the enclosing image.
    pub fn translated(&self, dx: f64, dy: f64) -> Detection {
        Detection {
            center_x: (self.center_x + dx).max(0.0),
            center_y: (self.center_y + dy).max(0.0),
            ..self.clone()
        }
    }

    /// Sort by confidence, highest first.
    pub fn sort_by_confidence(detections: &mut [Detection]) {
        detections.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}
