use crate::shared::detection::Detection;
use crate::shared::math::bbox_union;

/// Greedy overlap-merge for detections gathered from overlapping tiles.
///
/// Walks detections from highest confidence down. A detection that overlaps
/// an already kept one by IoU or IoS above `threshold` is folded into it (box
/// union, confidence of the stronger); otherwise it is kept.
pub fn merge_overlapping(mut detections: Vec<Detection>, threshold: f64) -> Vec<Detection> {
    Detection::sort_by_confidence(&mut detections);

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let twin = kept
            .iter_mut()
            .find(|k| k.iou(&det) > threshold || k.ios(&det) > threshold);
        match twin {
            Some(k) => {
                let merged = Detection::from_corners(
                    bbox_union(&k.bbox(), &det.bbox()),
                    k.confidence.max(det.confidence),
                    k.class_label.clone(),
                );
                *k = merged;
            }
            None => kept.push(det),
        }
    }
    kept
}
