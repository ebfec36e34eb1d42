//! Binary masks as `Array2<u8>` indexed `[row, col]`, foreground = 1.

use ndarray::{Array2, ArrayView2};

use crate::shared::error::ValidationError;

pub type Mask = Array2<u8>;

pub fn foreground_count(mask: &ArrayView2<u8>) -> usize {
    mask.iter().filter(|&&v| v != 0).count()
}

/// Fill a polygon (pixel coordinates) into a `height`×`width` mask.
///
/// Even-odd scanline fill sampled at pixel centers.
pub fn rasterize_polygon(
    points: &[(f64, f64)],
    width: usize,
    height: usize,
) -> Result<Mask, ValidationError> {
    if points.len() < 3 {
        return Err(ValidationError(format!(
            "cannot rasterize polygon with {} points",
            points.len()
        )));
    }

    let mut mask = Mask::zeros((height, width));
    let n = points.len();
    let mut crossings: Vec<f64> = Vec::with_capacity(n);

    for row in 0..height {
        let y = row as f64 + 0.5;
        crossings.clear();
        for i in 0..n {
            let (x1, y1) = points[i];
            let (x2, y2) = points[(i + 1) % n];
            if (y1 <= y && y < y2) || (y2 <= y && y < y1) {
                crossings.push(x1 + (y - y1) / (y2 - y1) * (x2 - x1));
            }
        }
        crossings.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        for pair in crossings.chunks_exact(2) {
            // pixel centers x + 0.5 inside [pair[0], pair[1])
            let start = (pair[0] - 0.5).ceil().max(0.0) as usize;
            let end = ((pair[1] - 0.5).ceil().max(0.0) as usize).min(width);
            for col in start..end {
                mask[[row, col]] = 1;
            }
        }
    }

    Ok(mask)
}
