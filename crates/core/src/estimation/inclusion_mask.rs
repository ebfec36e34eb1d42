use crate::estimation::gaussian::blur_plane;
use crate::shared::detection::Detection;
use crate::shared::mask::Mask;

const ON: u8 = 255;
const BINARIZE_THRESHOLD: u8 = 127;

/// Area already accounted for by confirmed detections.
///
/// Each detection stamps a filled disk of radius
/// `radius_factor * max(width, height)` at its center. The stamped plane is
/// smoothed with a `blur_kernel` Gaussian and re-binarized at half intensity.
/// Returns a 0/1 mask of `height`×`width`.
pub fn inclusion_mask(
    detections: &[Detection],
    height: usize,
    width: usize,
    radius_factor: f64,
    blur_kernel: usize,
) -> Mask {
    let mut plane = Mask::zeros((height, width));
    if height == 0 || width == 0 {
        return plane;
    }

    for det in detections {
        let radius = radius_factor * det.width.max(det.height);
        if radius <= 0.0 {
            continue;
        }
        stamp_disk(&mut plane, det.center_x, det.center_y, radius);
    }

    if detections.is_empty() {
        return plane;
    }
    blur_plane(&plane, blur_kernel).mapv(|v| u8::from(v > BINARIZE_THRESHOLD))
}

/// Fill pixels whose centers lie within `radius` of `(cx, cy)`.
fn stamp_disk(plane: &mut Mask, cx: f64, cy: f64, radius: f64) {
    let (height, width) = plane.dim();
    let r2 = radius * radius;
    let y0 = (cy - radius).floor().max(0.0) as usize;
    let y1 = ((cy + radius).ceil().max(0.0) as usize).min(height);

    for y in y0..y1 {
        let dy = y as f64 + 0.5 - cy;
        let span2 = r2 - dy * dy;
        if span2 < 0.0 {
            continue;
        }
        let span = span2.sqrt();
        let x0 = (cx - span - 0.5).ceil().max(0.0) as usize;
        let x1 = ((cx + span - 0.5).floor() + 1.0).max(0.0) as usize;
        for x in x0..x1.min(width) {
            plane[[y, x]] = ON;
        }
    }
}
