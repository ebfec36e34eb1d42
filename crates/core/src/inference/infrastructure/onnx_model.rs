/// ONNX Runtime backed inference handles and the loader that builds them.
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ndarray::{Array4, ArrayD};

use crate::inference::domain::inference_model::{Device, InferenceModel, ModelKind};
use crate::inference::domain::model_loader::ModelLoader;
use crate::inference::infrastructure::execution_provider::execution_providers_for;
use crate::shared::config::ModelConfig;
use crate::shared::error::{InferenceError, ResourceLoadError};

/// A committed `ort` session bound to one device.
///
/// `Session::run` needs `&mut`, so the session sits behind its own mutex.
/// Each worker slot owns a separate instance, so the lock is uncontended in
/// normal operation.
pub struct OnnxModel {
    session: Mutex<ort::session::Session>,
    device: Device,
    input_size: Option<u32>,
}

impl OnnxModel {
    pub fn load(
        kind: ModelKind,
        path: &Path,
        device: Device,
        intra_threads: Option<usize>,
    ) -> Result<Self, ResourceLoadError> {
        let unreadable = |message: String| ResourceLoadError::ArtifactUnreadable {
            kind,
            path: path.to_path_buf(),
            message,
        };

        std::fs::File::open(path).map_err(|e| unreadable(e.to_string()))?;

        let intra_threads = intra_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        let builder = ort::session::Session::builder().map_err(|e| unreadable(e.to_string()))?;
        let builder = builder
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| unreadable(e.to_string()))?;
        let builder = builder
            .with_inter_threads(1)
            .map_err(|e| unreadable(e.to_string()))?;
        let builder = builder
            .with_intra_threads(intra_threads)
            .map_err(|e| unreadable(e.to_string()))?;
        let mut builder = builder
            .with_execution_providers(execution_providers_for(device))
            .map_err(|e| ResourceLoadError::DeviceBinding {
                kind,
                device,
                message: e.to_string(),
            })?;

        let session = builder.commit_from_file(path).map_err(|e| match device {
            Device::Accelerator(_) => ResourceLoadError::DeviceBinding {
                kind,
                device,
                message: e.to_string(),
            },
            Device::Cpu => unreadable(e.to_string()),
        })?;

        // NCHW: [1, 3, H, W]; dynamic axes report as non-positive
        let input_size = session.inputs().first().and_then(|input| {
            if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                if shape.len() >= 4 && shape[2] > 0 {
                    Some(shape[2] as u32)
                } else {
                    None
                }
            } else {
                None
            }
        });

        Ok(Self {
            session: Mutex::new(session),
            device,
            input_size,
        })
    }
}

impl InferenceModel for OnnxModel {
    fn device(&self) -> Device {
        self.device
    }

    fn input_size(&self) -> Option<u32> {
        self.input_size
    }

    fn run(&self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>, InferenceError> {
        let input_value = ort::value::Tensor::from_array(input)
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| InferenceError::Runtime(format!("Lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;

        let mut arrays = Vec::with_capacity(outputs.len());
        for i in 0..outputs.len() {
            let array = outputs[i]
                .try_extract_array::<f32>()
                .map_err(|e| InferenceError::UnexpectedOutput(e.to_string()))?;
            arrays.push(array.to_owned());
        }
        if arrays.is_empty() {
            return Err(InferenceError::UnexpectedOutput(
                "model produced no outputs".into(),
            ));
        }
        Ok(arrays)
    }
}

/// Loads artifacts named in [`ModelConfig`] into [`OnnxModel`]s.
pub struct OnnxModelLoader {
    config: ModelConfig,
}

impl OnnxModelLoader {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    fn path_for(&self, kind: ModelKind) -> Result<PathBuf, ResourceLoadError> {
        self.config
            .artifact_path(kind)
            .map_err(|e| ResourceLoadError::ArtifactUnreadable {
                kind,
                path: PathBuf::new(),
                message: e.to_string(),
            })
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(
        &self,
        kind: ModelKind,
        device: Device,
    ) -> Result<Arc<dyn InferenceModel>, ResourceLoadError> {
        let path = self.path_for(kind)?;
        let model = OnnxModel::load(kind, &path, device, self.config.intra_threads)?;
        Ok(Arc::new(model))
    }
}
