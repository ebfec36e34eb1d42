use ndarray::Array4;

use crate::shared::frame::Frame;

/// Gray fill for padded pixels (YOLO convention).
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Transform from a source frame into a square letterboxed model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f64,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// Map a point in model input coordinates back to frame pixels.
    pub fn unmap(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }

    /// Map a frame pixel into model input coordinates.
    pub fn map(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.scale + self.pad_x as f64,
            y * self.scale + self.pad_y as f64,
        )
    }
}

/// Letterbox-resize a frame to `target_size`×`target_size`.
///
/// Returns the NCHW float32 tensor and the transform that produced it.
pub fn letterbox(frame: &Frame, target_size: u32) -> (Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let mut tensor = Array4::<f32>::from_elem(
        (1, 3, target_size as usize, target_size as usize),
        PAD_VALUE,
    );

    let src_w = frame.width() as usize;
    let src_h = frame.height() as usize;

    // nearest-neighbour resize into the padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let rgb = frame.pixel(src_x, src_y);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for (c, &value) in rgb.iter().enumerate() {
                tensor[[0, c, ty, tx]] = value as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

/// Round `size` up to the next multiple of 32 (minimum 32).
pub fn align_to_stride(size: u32) -> u32 {
    size.max(1).div_ceil(32) * 32
}
