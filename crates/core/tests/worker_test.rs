use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgb, RgbImage};
use ndarray::{Array3, Array4, ArrayD};
use tempfile::TempDir;

use plantcount_core::inference::domain::inference_model::{Device, InferenceModel, ModelKind};
use plantcount_core::inference::domain::model_loader::ModelLoader;
use plantcount_core::orchestration::domain::aggregate::JobStatus;
use plantcount_core::orchestration::domain::durable_sink::JobRecord;
use plantcount_core::orchestration::domain::job::{ImageDescriptor, JobSubmission};
use plantcount_core::orchestration::infrastructure::json_file_sink::JsonFileSink;
use plantcount_core::pipeline::infrastructure::file_image_source::FileImageSource;
use plantcount_core::shared::config::CoreConfig;
use plantcount_core::shared::error::{InferenceError, ResourceLoadError};
use plantcount_core::shared::segment_region::ContainerType;
use plantcount_core::worker::Worker;

const INPUT: u32 = 64;

/// Model with a static 64 px input that always returns the same tensors.
struct CannedModel {
    outputs: Vec<ArrayD<f32>>,
}

impl InferenceModel for CannedModel {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn input_size(&self) -> Option<u32> {
        Some(INPUT)
    }

    fn run(&self, _input: Array4<f32>) -> Result<Vec<ArrayD<f32>>, InferenceError> {
        Ok(self.outputs.clone())
    }
}

/// One container in the middle of the photo and one plant in it.
struct CannedLoader {
    loads: AtomicUsize,
}

impl CannedLoader {
    /// `[1, 4 + 1, anchors]`, feature-major.
    fn head(rows: &[[f32; 5]], anchors: usize) -> ArrayD<f32> {
        let mut head = Array3::<f32>::zeros((1, 5, anchors));
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                head[[0, j, i]] = v;
            }
        }
        head.into_dyn()
    }
}

impl ModelLoader for CannedLoader {
    fn load(
        &self,
        kind: ModelKind,
        _device: Device,
    ) -> Result<Arc<dyn InferenceModel>, ResourceLoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let outputs = match kind {
            // 32×32 px container centred in the 64×64 photo, no mask prototypes
            ModelKind::Segmentation => vec![Self::head(&[[32.0, 32.0, 32.0, 32.0, 0.9]], 8)],
            // the 32 px crop is letterboxed ×2; one 10 px plant at the crop centre
            ModelKind::Detection => vec![Self::head(&[[32.0, 32.0, 20.0, 20.0, 0.8]], 8)],
        };
        Ok(Arc::new(CannedModel { outputs }))
    }
}

fn write_photo(dir: &Path, name: &str) {
    RgbImage::from_pixel(INPUT, INPUT, Rgb([90, 200, 80]))
        .save(dir.join(name))
        .unwrap();
}

fn config() -> CoreConfig {
    let mut cfg = CoreConfig::default();
    cfg.models.segmentation_classes = vec!["plug".into()];
    cfg.orchestration.gpu_workers = 1;
    cfg.orchestration.compute_workers = 1;
    cfg.orchestration.retry.base_delay_ms = 1;
    cfg
}

fn submission(locators: &[&str]) -> JobSubmission {
    JobSubmission {
        job_id: "survey-7".into(),
        images: locators
            .iter()
            .map(|l| ImageDescriptor {
                external_image_id: l.to_string(),
                readable_locator: l.to_string(),
                spatial_context_id: "house-1".into(),
            })
            .collect(),
    }
}

#[test]
fn test_worker_counts_photos_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();
    let photos = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_photo(photos.path(), "a.png");
    write_photo(photos.path(), "b.png");
    let loader = Arc::new(CannedLoader {
        loads: AtomicUsize::new(0),
    });

    let worker = Worker::with_loader(
        &config(),
        loader.clone(),
        Arc::new(FileImageSource::new(Some(photos.path().to_path_buf()))),
        Arc::new(JsonFileSink::new(out.path())),
    )
    .unwrap();

    let report = worker
        .orchestrator()
        .submit(submission(&["a.png", "b.png"]))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(report.aggregate.final_status, JobStatus::Completed);
    assert_eq!(report.aggregate.units_succeeded, 2);
    assert_eq!(report.aggregate.total_detected, 2);

    let first = report.outcomes[0].result().unwrap();
    assert_eq!(first.segments_processed, 1);
    let plant = &first.detections[0];
    assert!((plant.center_x - 32.0).abs() < 1e-6);
    assert!((plant.center_y - 32.0).abs() < 1e-6);
    assert_eq!(first.band_estimates.len(), 4);
    assert!(first
        .band_estimates
        .iter()
        .all(|b| b.container_type == ContainerType::Plug && b.y_start >= 16 && b.y_end <= 48));

    // one handle per kind on the single accelerator slot
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);

    let json = std::fs::read_to_string(out.path().join("survey-7.json")).unwrap();
    let record: JobRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(record.aggregate.job_id, "survey-7");
    assert_eq!(record.aggregate.total_detected, 2);
    assert_eq!(record.units.len(), 2);

    worker.shutdown();
}

#[test]
fn test_worker_missing_photo_fails_job() {
    let photos = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let worker = Worker::with_loader(
        &config(),
        Arc::new(CannedLoader {
            loads: AtomicUsize::new(0),
        }),
        Arc::new(FileImageSource::new(Some(photos.path().to_path_buf()))),
        Arc::new(JsonFileSink::new(out.path())),
    )
    .unwrap();

    let report = worker
        .orchestrator()
        .submit(submission(&["nowhere.png"]))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(report.aggregate.final_status, JobStatus::Failed);
    assert_eq!(report.aggregate.units_submitted, 1);
    assert_eq!(worker.orchestrator().breaker().snapshot().failure_count, 1);
}
