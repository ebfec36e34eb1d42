pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod mask;
pub mod math;
pub mod segment_region;
