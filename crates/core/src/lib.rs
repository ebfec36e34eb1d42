pub mod detection;
pub mod estimation;
pub mod inference;
pub mod orchestration;
pub mod pipeline;
pub mod segmentation;
pub mod shared;
pub mod worker;
