pub mod execution_provider;
pub mod letterbox;
pub mod onnx_model;
pub mod yolo_output;
