//! Removal of bare floor and soil from residual container area.
//!
//! Two signals are combined: a brightness split chosen by Otsu's method over
//! the residual pixels only, and a hue/saturation/value test for soil
//! colours. A pixel survives when it is bright AND not soil. One 3×3
//! morphological opening then removes isolated speckle.

use ndarray::ArrayView2;

use crate::shared::frame::Frame;
use crate::shared::mask::Mask;

/// Brown hues, in degrees.
const SOIL_HUE_RANGE: (f64, f64) = (10.0, 40.0);
const SOIL_MIN_SATURATION: f64 = 0.15;
const SOIL_MAX_VALUE: f64 = 0.6;

/// Keep the residual pixels of one band that look like plant material.
///
/// `residual` covers rows `y_offset..y_offset + residual.nrows()` of `image`.
/// The returned mask has the same shape as `residual` and is a subset of it.
pub fn suppress_floor(image: &Frame, residual: &ArrayView2<u8>, y_offset: usize) -> Mask {
    let (rows, cols) = residual.dim();
    let mut keep = Mask::zeros((rows, cols));

    let mut histogram = [0u64; 256];
    for ((r, c), &v) in residual.indexed_iter() {
        if v != 0 {
            let [red, green, blue] = image.pixel(c, y_offset + r);
            histogram[luma(red, green, blue) as usize] += 1;
        }
    }
    let threshold = otsu_threshold(&histogram);

    for ((r, c), &v) in residual.indexed_iter() {
        if v == 0 {
            continue;
        }
        let [red, green, blue] = image.pixel(c, y_offset + r);
        // a single brightness level gives no split; the soil test decides alone
        let bright = threshold.map_or(true, |t| luma(red, green, blue) > t);
        if bright && !is_soil(red, green, blue) {
            keep[[r, c]] = 1;
        }
    }

    open_3x3(&keep)
}

/// ITU-R BT.601 luma.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Otsu's threshold: pixels `> t` are the bright class.
///
/// `None` when the histogram holds fewer than two distinct levels.
pub fn otsu_threshold(histogram: &[u64; 256]) -> Option<u8> {
    let total: u64 = histogram.iter().sum();
    if histogram.iter().filter(|&&n| n > 0).count() < 2 {
        return None;
    }
    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &n)| i as f64 * n as f64)
        .sum();

    let mut weight_bg = 0u64;
    let mut sum_bg = 0.0f64;
    let mut best = (0u8, -1.0f64);

    for (t, &n) in histogram.iter().enumerate() {
        weight_bg += n;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += t as f64 * n as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let between = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);
        if between > best.1 {
            best = (t as u8, between);
        }
    }
    Some(best.0)
}

fn is_soil(r: u8, g: u8, b: u8) -> bool {
    let (h, s, v) = rgb_to_hsv(r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);
    (SOIL_HUE_RANGE.0..=SOIL_HUE_RANGE.1).contains(&h)
        && s >= SOIL_MIN_SATURATION
        && v <= SOIL_MAX_VALUE
}

/// Hue in degrees, saturation and value in `[0, 1]`.
fn rgb_to_hsv(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta / max } else { 0.0 };

    let h = if delta == 0.0 {
        0.0
    } else if (max - r).abs() < f64::EPSILON {
        60.0 * (((g - b) / delta) % 6.0)
    } else if (max - g).abs() < f64::EPSILON {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let h = if h < 0.0 { h + 360.0 } else { h };

    (h, s, v)
}

/// Erosion followed by dilation with a 3×3 square. Out-of-bounds neighbours
/// are ignored, so the result never exceeds the input.
fn open_3x3(mask: &Mask) -> Mask {
    let eroded = morph_3x3(mask, |window| window.iter().all(|&v| v != 0));
    morph_3x3(&eroded, |window| window.iter().any(|&v| v != 0))
}

fn morph_3x3(mask: &Mask, rule: impl Fn(&[u8]) -> bool) -> Mask {
    let (rows, cols) = mask.dim();
    let mut out = Mask::zeros((rows, cols));
    let mut window = Vec::with_capacity(9);
    for r in 0..rows {
        for c in 0..cols {
            window.clear();
            for nr in r.saturating_sub(1)..(r + 2).min(rows) {
                for nc in c.saturating_sub(1)..(c + 2).min(cols) {
                    window.push(mask[[nr, nc]]);
                }
            }
            out[[r, c]] = u8::from(rule(&window));
        }
    }
    out
}
