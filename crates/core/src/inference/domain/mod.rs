pub mod inference_model;
pub mod model_loader;
