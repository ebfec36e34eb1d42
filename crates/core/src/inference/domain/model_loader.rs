use std::sync::Arc;

use crate::inference::domain::inference_model::{Device, InferenceModel, ModelKind};
use crate::shared::error::ResourceLoadError;

/// Port for turning a model kind into a device-bound inference handle.
///
/// Called by the resource cache at most once per (kind, slot).
pub trait ModelLoader: Send + Sync {
    fn load(&self, kind: ModelKind, device: Device)
        -> Result<Arc<dyn InferenceModel>, ResourceLoadError>;
}
