/// Decoding of YOLO-family output tensors shared by the segmentation and
/// detection backends.
use ndarray::{ArrayD, ArrayView2, Axis, Ix3, Ix4};

use crate::inference::infrastructure::letterbox::Letterbox;
use crate::shared::error::InferenceError;
use crate::shared::math::{bbox_iou, BBox};

/// One scored box before NMS, in source-frame pixel coordinates.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub bbox: BBox,
    pub confidence: f64,
    pub class_id: usize,
    /// Prototype mask coefficients (segmentation models only).
    pub mask_coeffs: Vec<f32>,
}

/// Parse `[1, features, N]` or `[1, N, features]` output into candidates at or
/// above `threshold`.
///
/// Row layout: `[cx, cy, w, h, class scores..., mask coeffs...]`, box in
/// letterbox input coordinates. `num_mask_coeffs` is 0 for plain detection.
pub fn parse_candidates(
    output: &ArrayD<f32>,
    num_mask_coeffs: usize,
    threshold: f64,
    letterbox: &Letterbox,
    frame_size: (u32, u32),
) -> Result<Vec<Candidate>, InferenceError> {
    let output = output
        .view()
        .into_dimensionality::<Ix3>()
        .map_err(|_| {
            InferenceError::UnexpectedOutput(format!("YOLO output shape {:?}", output.shape()))
        })?;
    let matrix = output.index_axis_move(Axis(0), 0);

    // features are the short axis
    let rows: ArrayView2<f32> = if matrix.nrows() < matrix.ncols() {
        matrix.reversed_axes()
    } else {
        matrix
    };

    let num_feats = rows.ncols();
    if num_feats <= 4 + num_mask_coeffs {
        return Err(InferenceError::UnexpectedOutput(format!(
            "YOLO rows have {num_feats} features, need more than {}",
            4 + num_mask_coeffs
        )));
    }
    let num_classes = num_feats - 4 - num_mask_coeffs;
    let (fw, fh) = (frame_size.0 as f64, frame_size.1 as f64);

    let mut candidates = Vec::new();
    for row in rows.outer_iter() {
        let (class_id, score) = row
            .iter()
            .skip(4)
            .take(num_classes)
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &s)| if s > best.1 { (i, s) } else { best });
        let confidence = score as f64;
        if confidence < threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64);
        let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);
        let bbox = [
            x1.clamp(0.0, fw),
            y1.clamp(0.0, fh),
            x2.clamp(0.0, fw),
            y2.clamp(0.0, fh),
        ];
        if bbox[2] <= bbox[0] || bbox[3] <= bbox[1] {
            continue;
        }

        candidates.push(Candidate {
            bbox,
            confidence,
            class_id,
            mask_coeffs: row.iter().skip(4 + num_classes).copied().collect(),
        });
    }

    Ok(candidates)
}

/// Greedy per-class NMS: highest confidence first, suppress same-class boxes
/// overlapping a kept one by more than `iou_thresh`.
pub fn nms(mut candidates: Vec<Candidate>, iou_thresh: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let suppressed = keep.iter().any(|k| {
            k.class_id == candidate.class_id && bbox_iou(&k.bbox, &candidate.bbox) > iou_thresh
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

/// Decode a candidate's instance mask from `protos` (`[1, nm, mh, mw]`) and
/// return its foreground points in source-frame pixels.
///
/// Only prototype cells inside the candidate's box are considered.
pub fn mask_points(
    protos: &ArrayD<f32>,
    candidate: &Candidate,
    letterbox: &Letterbox,
    input_size: u32,
) -> Result<Vec<(f64, f64)>, InferenceError> {
    let protos = protos
        .view()
        .into_dimensionality::<Ix4>()
        .map_err(|_| {
            InferenceError::UnexpectedOutput(format!("prototype shape {:?}", protos.shape()))
        })?;
    let protos = protos.index_axis_move(Axis(0), 0);
    let (nm, mh, mw) = protos.dim();
    if nm != candidate.mask_coeffs.len() {
        return Err(InferenceError::UnexpectedOutput(format!(
            "{nm} prototypes but {} mask coefficients",
            candidate.mask_coeffs.len()
        )));
    }

    // frame px -> letterbox px -> prototype cells
    let to_proto = mw as f64 / input_size as f64;
    let (lx1, ly1) = letterbox.map(candidate.bbox[0], candidate.bbox[1]);
    let (lx2, ly2) = letterbox.map(candidate.bbox[2], candidate.bbox[3]);
    let c0 = ((lx1 * to_proto).floor().max(0.0) as usize).min(mw);
    let r0 = ((ly1 * to_proto).floor().max(0.0) as usize).min(mh);
    let c1 = ((lx2 * to_proto).ceil().max(0.0) as usize).min(mw);
    let r1 = ((ly2 * to_proto).ceil().max(0.0) as usize).min(mh);

    let mut points = Vec::new();
    for r in r0..r1 {
        for c in c0..c1 {
            let logit: f32 = candidate
                .mask_coeffs
                .iter()
                .enumerate()
                .map(|(k, &coeff)| coeff * protos[[k, r, c]])
                .sum();
            // sigmoid(logit) > 0.5
            if logit > 0.0 {
                let cx = (c as f64 + 0.5) / to_proto;
                let cy = (r as f64 + 0.5) / to_proto;
                points.push(letterbox.unmap(cx, cy));
            }
        }
    }
    Ok(points)
}
