/// Perspective-aware count estimation for plants the detector could not
/// separate.
///
/// The container's undetected area is cut into horizontal bands, and each band
/// is converted to a count using an object size calibrated from the
/// detections inside that band. Far rows of an oblique photo hold smaller
/// plants than near rows, so one global size would skew the count.
use ndarray::{s, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use crate::estimation::calibration::calibrate_object_area;
use crate::estimation::floor_suppression::suppress_floor;
use crate::estimation::inclusion_mask::inclusion_mask;
use crate::shared::config::EstimationConfig;
use crate::shared::detection::Detection;
use crate::shared::error::ValidationError;
use crate::shared::frame::Frame;
use crate::shared::mask::{foreground_count, Mask};
use crate::shared::segment_region::ContainerType;

const ADVISORY_FACTOR_RANGE: (f64, f64) = (0.5, 1.5);

/// Estimated count for one horizontal band of a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandEstimate {
    /// 1-based, top to bottom.
    pub band_index: usize,
    pub y_start: usize,
    pub y_end: usize,
    pub residual_area_px: u64,
    pub processed_area_px: u64,
    pub floor_suppressed_px: u64,
    pub estimated_count: u64,
    pub average_object_area_px: f64,
    pub overcount_factor: f64,
    pub container_type: ContainerType,
}

pub struct BandEstimator {
    config: EstimationConfig,
}

impl BandEstimator {
    pub fn new(config: EstimationConfig) -> Self {
        Self { config }
    }

    /// Estimate undetected plants in one container, band by band.
    ///
    /// `container_mask` must match `image` in shape (`[height, width]`);
    /// detections are in `image` pixel coordinates. Always returns exactly
    /// `num_bands` records, top to bottom.
    pub fn estimate(
        &self,
        detections: &[Detection],
        container_mask: &ArrayView2<u8>,
        image: &Frame,
        container_type: &ContainerType,
    ) -> Result<Vec<BandEstimate>, ValidationError> {
        let num_bands = self.config.num_bands;
        let factor = self.config.overcount_factor;
        let (height, width) = (image.height() as usize, image.width() as usize);

        if num_bands == 0 {
            return Err(ValidationError("num_bands must be at least 1".into()));
        }
        if container_mask.dim() != (height, width) {
            return Err(ValidationError(format!(
                "container mask is {:?} but image is {height}x{width}",
                container_mask.dim()
            )));
        }
        if !(factor > 0.0 && factor.is_finite()) {
            return Err(ValidationError(format!(
                "overcount factor must be positive, got {factor}"
            )));
        }
        if factor < ADVISORY_FACTOR_RANGE.0 || factor > ADVISORY_FACTOR_RANGE.1 {
            log::warn!(
                "Overcount factor {factor} outside advisory range {:?}",
                ADVISORY_FACTOR_RANGE
            );
        }

        let inclusion = inclusion_mask(
            detections,
            height,
            width,
            self.config.inclusion_radius_factor,
            self.config.inclusion_blur_kernel,
        );
        let residual: Mask = Zip::from(container_mask)
            .and(&inclusion)
            .map_collect(|&m, &i| u8::from(m != 0 && i == 0));

        let bands = band_rows(height, num_bands);
        if foreground_count(&residual.view()) == 0 {
            log::debug!("No residual area in {container_type} container");
            return Ok(bands
                .into_iter()
                .enumerate()
                .map(|(i, rows)| self.zero_band(i, rows, 0, container_type))
                .collect());
        }

        let mut estimates = Vec::with_capacity(num_bands);
        for (i, (y_start, y_end)) in bands.into_iter().enumerate() {
            let band_residual = residual.slice(s![y_start..y_end, ..]);
            let residual_px = foreground_count(&band_residual) as u64;
            if residual_px == 0 {
                estimates.push(self.zero_band(i, (y_start, y_end), 0, container_type));
                continue;
            }

            let kept = suppress_floor(image, &band_residual, y_start);
            let processed_px = foreground_count(&kept.view()) as u64;
            if processed_px == 0 {
                estimates.push(self.zero_band(i, (y_start, y_end), residual_px, container_type));
                continue;
            }

            let last = i + 1 == num_bands;
            let areas: Vec<f64> = detections
                .iter()
                .filter(|d| {
                    let cy = d.center_y;
                    cy >= y_start as f64 && (cy < y_end as f64 || (last && cy <= y_end as f64))
                })
                .map(Detection::area)
                .collect();
            let avg_area = calibrate_object_area(
                &areas,
                self.config.min_calibration_samples,
                self.config.fallback_object_area_px,
            );

            let estimated_count = (processed_px as f64 / (avg_area * factor)).ceil() as u64;
            log::debug!(
                "Band {}/{num_bands} rows {y_start}..{y_end}: {processed_px}/{residual_px} px, \
                 avg area {avg_area:.1} from {} sample(s), estimate {estimated_count}",
                i + 1,
                areas.len()
            );

            estimates.push(BandEstimate {
                band_index: i + 1,
                y_start,
                y_end,
                residual_area_px: residual_px,
                processed_area_px: processed_px,
                floor_suppressed_px: residual_px - processed_px,
                estimated_count,
                average_object_area_px: avg_area,
                overcount_factor: factor,
                container_type: container_type.clone(),
            });
        }

        Ok(estimates)
    }

    fn zero_band(
        &self,
        index: usize,
        (y_start, y_end): (usize, usize),
        residual_px: u64,
        container_type: &ContainerType,
    ) -> BandEstimate {
        BandEstimate {
            band_index: index + 1,
            y_start,
            y_end,
            residual_area_px: residual_px,
            processed_area_px: 0,
            floor_suppressed_px: residual_px,
            estimated_count: 0,
            average_object_area_px: self.config.fallback_object_area_px,
            overcount_factor: self.config.overcount_factor,
            container_type: container_type.clone(),
        }
    }
}

/// Row ranges of `num_bands` equal strips; the last absorbs the remainder.
fn band_rows(height: usize, num_bands: usize) -> Vec<(usize, usize)> {
    let band_h = height / num_bands;
    (0..num_bands)
        .map(|i| {
            let start = i * band_h;
            let end = if i + 1 == num_bands {
                height
            } else {
                start + band_h
            };
            (start, end)
        })
        .collect()
}
