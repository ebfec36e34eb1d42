pub mod band_estimator;
pub mod calibration;
pub mod floor_suppression;
mod gaussian;
pub mod inclusion_mask;
