use std::fmt;

use ndarray::{Array4, ArrayD};
use serde::{Deserialize, Serialize};

use crate::shared::error::InferenceError;

/// Which model a cached handle serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Segmentation,
    Detection,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Segmentation => write!(f, "segmentation"),
            ModelKind::Detection => write!(f, "detection"),
        }
    }
}

/// Compute device a model instance is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Accelerator(usize),
    Cpu,
}

impl Device {
    /// Device for a worker slot: `slot mod device_count`, or CPU when no
    /// accelerators are configured.
    pub fn for_slot(slot: usize, accelerator_count: usize) -> Self {
        if accelerator_count == 0 {
            Device::Cpu
        } else {
            Device::Accelerator(slot % accelerator_count)
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Accelerator(id) => write!(f, "accelerator:{id}"),
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

/// A loaded, device-bound model ready for inference.
///
/// Takes a single NCHW float batch and returns every model output in
/// declaration order. Implementations synchronize internally; callers never
/// hold a cache lock across `run`.
pub trait InferenceModel: Send + Sync {
    fn device(&self) -> Device;

    /// Square input resolution the model expects, if it declares one.
    fn input_size(&self) -> Option<u32>;

    fn run(&self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>, InferenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 2, Device::Accelerator(0))]
    #[case(1, 2, Device::Accelerator(1))]
    #[case(5, 2, Device::Accelerator(1))]
    #[case(3, 1, Device::Accelerator(0))]
    #[case(3, 0, Device::Cpu)]
    fn test_device_for_slot(#[case] slot: usize, #[case] count: usize, #[case] expected: Device) {
        assert_eq!(Device::for_slot(slot, count), expected);
    }

    #[test]
    fn test_display() {
        assert_eq!(Device::Accelerator(3).to_string(), "accelerator:3");
        assert_eq!(Device::Cpu.to_string(), "cpu");
        assert_eq!(ModelKind::Segmentation.to_string(), "segmentation");
    }
}
