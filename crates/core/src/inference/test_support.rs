//! Canned models for exercising the inference-backed stages without ONNX.

use std::sync::Arc;

use ndarray::{Array4, ArrayD};

use crate::inference::domain::inference_model::{Device, InferenceModel, ModelKind};
use crate::inference::domain::model_loader::ModelLoader;
use crate::inference::resource_cache::ResourceCache;
use crate::shared::error::{InferenceError, ResourceLoadError};

/// Returns the same outputs for every input of the expected square size.
pub struct FixedModel {
    pub outputs: Vec<ArrayD<f32>>,
    pub input_size: u32,
}

impl InferenceModel for FixedModel {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn input_size(&self) -> Option<u32> {
        Some(self.input_size)
    }

    fn run(&self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>, InferenceError> {
        let size = self.input_size as usize;
        assert_eq!(input.shape(), &[1, 3, size, size]);
        Ok(self.outputs.clone())
    }
}

/// Loads a [`FixedModel`], or fails device binding when `outputs` is `None`.
pub struct FixedLoader {
    pub outputs: Option<Vec<ArrayD<f32>>>,
    pub input_size: u32,
}

impl ModelLoader for FixedLoader {
    fn load(
        &self,
        kind: ModelKind,
        device: Device,
    ) -> Result<Arc<dyn InferenceModel>, ResourceLoadError> {
        match &self.outputs {
            Some(outputs) => Ok(Arc::new(FixedModel {
                outputs: outputs.clone(),
                input_size: self.input_size,
            })),
            None => Err(ResourceLoadError::DeviceBinding {
                kind,
                device,
                message: "no device".into(),
            }),
        }
    }
}

pub fn fixed_cache(outputs: Option<Vec<ArrayD<f32>>>, input_size: u32) -> Arc<ResourceCache> {
    Arc::new(ResourceCache::new(
        Arc::new(FixedLoader {
            outputs,
            input_size,
        }),
        0,
    ))
}
