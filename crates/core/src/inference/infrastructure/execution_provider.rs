use ort::execution_providers::ExecutionProviderDispatch;

use crate::inference::domain::inference_model::Device;

/// Execution providers that bind a session to `device`.
///
/// CPU needs none (ONNX Runtime's default). For an accelerator the
/// platform-specific provider is registered; with the `cuda` feature the CUDA
/// provider is mandatory so a failed binding surfaces as an error instead of a
/// silent CPU fallback.
pub fn execution_providers_for(device: Device) -> Vec<ExecutionProviderDispatch> {
    match device {
        Device::Cpu => Vec::new(),
        Device::Accelerator(id) => accelerator_providers(id),
    }
}

#[cfg(feature = "cuda")]
fn accelerator_providers(id: usize) -> Vec<ExecutionProviderDispatch> {
    vec![ort::execution_providers::CUDAExecutionProvider::default()
        .with_device_id(id as i32)
        .build()
        .error_on_failure()]
}

#[cfg(all(not(feature = "cuda"), target_os = "macos"))]
fn accelerator_providers(_id: usize) -> Vec<ExecutionProviderDispatch> {
    vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
}

#[cfg(all(not(feature = "cuda"), target_os = "windows"))]
fn accelerator_providers(id: usize) -> Vec<ExecutionProviderDispatch> {
    vec![ort::execution_providers::DirectMLExecutionProvider::default()
        .with_device_id(id as i32)
        .build()]
}

#[cfg(all(
    not(feature = "cuda"),
    not(any(target_os = "macos", target_os = "windows"))
))]
fn accelerator_providers(id: usize) -> Vec<ExecutionProviderDispatch> {
    log::warn!("Built without the `cuda` feature; accelerator {id} runs on CPU");
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_uses_default_provider() {
        assert!(execution_providers_for(Device::Cpu).is_empty());
    }
}
