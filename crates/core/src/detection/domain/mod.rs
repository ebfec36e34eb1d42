pub mod detection_merger;
pub mod object_detector;
pub mod tiled_detector;
