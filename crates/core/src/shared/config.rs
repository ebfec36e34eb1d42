use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::inference::domain::inference_model::ModelKind;
use crate::shared::error::ConfigError;

/// Top-level worker configuration, read once at start-up.
///
/// Every field has a default so a partial JSON file only needs to name what
/// it overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub models: ModelConfig,
    pub segmentation: SegmentationConfig,
    pub detection: DetectionConfig,
    pub estimation: EstimationConfig,
    pub orchestration: OrchestrationConfig,
}

impl CoreConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base directory for relative artifact paths. Defaults to the user
    /// cache directory.
    pub models_dir: Option<PathBuf>,
    pub segmentation_model: PathBuf,
    pub detection_model: PathBuf,
    /// Raw segmentation class names, indexed by model class id.
    pub segmentation_classes: Vec<String>,
    pub detection_classes: Vec<String>,
    /// Accelerators visible to this worker process; 0 runs on CPU.
    pub accelerator_count: usize,
    pub intra_threads: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            models_dir: None,
            segmentation_model: PathBuf::from("container_seg.onnx"),
            detection_model: PathBuf::from("plant_det.onnx"),
            segmentation_classes: vec!["plug".into(), "box".into(), "segment".into()],
            detection_classes: vec!["plant".into()],
            accelerator_count: 0,
            intra_threads: None,
        }
    }
}

impl ModelConfig {
    /// Resolve the artifact path for `kind`. Absolute paths are used as-is.
    pub fn artifact_path(&self, kind: ModelKind) -> Result<PathBuf, ConfigError> {
        let file = match kind {
            ModelKind::Segmentation => &self.segmentation_model,
            ModelKind::Detection => &self.detection_model,
        };
        if file.is_absolute() {
            return Ok(file.clone());
        }
        let base = match &self.models_dir {
            Some(dir) => dir.clone(),
            None => default_model_dir()?,
        };
        Ok(base.join(file))
    }

    pub fn class_names(&self, kind: ModelKind) -> &[String] {
        match kind {
            ModelKind::Segmentation => &self.segmentation_classes,
            ModelKind::Detection => &self.detection_classes,
        }
    }
}

/// Platform cache location for model artifacts:
/// `<cache_dir>/plantcount/models`.
pub fn default_model_dir() -> Result<PathBuf, ConfigError> {
    dirs::cache_dir()
        .map(|d| d.join("plantcount").join("models"))
        .ok_or(ConfigError::NoModelDir)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub confidence: f64,
    /// Square inference resolution; rounded up to a multiple of 32.
    pub inference_size: u32,
    pub iou_threshold: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            inference_size: 1024,
            iou_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub confidence: f64,
    pub tile_size: u32,
    /// Fractional overlap between neighbouring tiles.
    pub overlap: f64,
    /// IoU/IoS above which two tile detections are merged.
    pub merge_threshold: f64,
    /// NMS IoU within a single model pass.
    pub nms_iou: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence: 0.25,
            tile_size: 512,
            overlap: 0.25,
            merge_threshold: 0.5,
            nms_iou: 0.45,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    pub num_bands: usize,
    pub overcount_factor: f64,
    pub fallback_object_area_px: f64,
    pub min_calibration_samples: usize,
    /// Inclusion disk radius as a multiple of max(width, height).
    pub inclusion_radius_factor: f64,
    /// Odd kernel size for smoothing the inclusion mask.
    pub inclusion_blur_kernel: usize,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            num_bands: 4,
            overcount_factor: 0.9,
            fallback_object_area_px: 1600.0,
            min_calibration_samples: 10,
            inclusion_radius_factor: 0.85,
            inclusion_blur_kernel: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Accelerator-bound workers; each runs one unit at a time.
    pub gpu_workers: usize,
    /// Workers for job entry and aggregation. 0 means one per core.
    pub compute_workers: usize,
    /// Deadline per unit at the fan-in barrier. `None` waits indefinitely.
    pub unit_timeout_secs: Option<u64>,
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            gpu_workers: 1,
            compute_workers: 0,
            unit_timeout_secs: Some(900),
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl OrchestrationConfig {
    pub fn unit_timeout(&self) -> Option<Duration> {
        self.unit_timeout_secs.map(Duration::from_secs)
    }

    pub fn effective_compute_workers(&self) -> usize {
        if self.compute_workers > 0 {
            return self.compute_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// First backoff; doubles on each further retry.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.detection.tile_size, 512);
        assert_eq!(cfg.estimation.num_bands, 4);
        assert_eq!(cfg.orchestration.retry.max_retries, 3);
        assert_eq!(cfg.orchestration.breaker.failure_threshold, 5);
        assert_eq!(cfg.orchestration.breaker.cooldown_secs, 300);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(
            &path,
            r#"{ "orchestration": { "gpu_workers": 4 }, "estimation": { "num_bands": 6 } }"#,
        )
        .unwrap();

        let cfg = CoreConfig::load(&path).unwrap();

        assert_eq!(cfg.orchestration.gpu_workers, 4);
        assert_eq!(cfg.orchestration.retry.base_delay_ms, 2000);
        assert_eq!(cfg.estimation.num_bands, 6);
        assert!((cfg.estimation.overcount_factor - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let err = CoreConfig::load(Path::new("/nonexistent/plantcount.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_invalid_json_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            CoreConfig::load(&path).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }

    #[test]
    fn test_artifact_path_joins_models_dir() {
        let cfg = ModelConfig {
            models_dir: Some(PathBuf::from("/opt/models")),
            ..Default::default()
        };
        assert_eq!(
            cfg.artifact_path(ModelKind::Detection).unwrap(),
            PathBuf::from("/opt/models/plant_det.onnx")
        );
    }

    #[test]
    fn test_artifact_path_absolute_is_unchanged() {
        let cfg = ModelConfig {
            segmentation_model: PathBuf::from("/srv/seg.onnx"),
            ..Default::default()
        };
        assert_eq!(
            cfg.artifact_path(ModelKind::Segmentation).unwrap(),
            PathBuf::from("/srv/seg.onnx")
        );
    }

    #[test]
    fn test_default_model_dir_is_namespaced() {
        if let Ok(dir) = default_model_dir() {
            assert!(dir.ends_with("plantcount/models"));
        }
    }
}
