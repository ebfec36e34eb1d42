//! Composition root: wires the ONNX-backed stages, the pipeline coordinator
//! and the orchestrator from one [`CoreConfig`].

use std::sync::Arc;

use crate::detection::domain::object_detector::ObjectDetector;
use crate::detection::domain::tiled_detector::TiledDetector;
use crate::detection::infrastructure::yolo_detector::YoloDetector;
use crate::estimation::band_estimator::BandEstimator;
use crate::inference::domain::inference_model::ModelKind;
use crate::inference::domain::model_loader::ModelLoader;
use crate::inference::infrastructure::onnx_model::OnnxModelLoader;
use crate::inference::resource_cache::ResourceCache;
use crate::orchestration::circuit_breaker::CircuitBreaker;
use crate::orchestration::domain::durable_sink::DurableSink;
use crate::orchestration::orchestrator::Orchestrator;
use crate::pipeline::domain::image_source::ImageSource;
use crate::pipeline::pipeline_coordinator::PipelineCoordinator;
use crate::segmentation::infrastructure::yolo_segmenter::YoloSegmenter;
use crate::shared::config::CoreConfig;

/// A running inference worker process.
pub struct Worker {
    orchestrator: Orchestrator,
    cache: Arc<ResourceCache>,
}

impl Worker {
    /// Build a worker backed by ONNX Runtime sessions.
    pub fn from_config(
        config: &CoreConfig,
        images: Arc<dyn ImageSource>,
        sink: Arc<dyn DurableSink>,
    ) -> std::io::Result<Self> {
        let loader: Arc<dyn ModelLoader> = Arc::new(OnnxModelLoader::new(config.models.clone()));
        Self::with_loader(config, loader, images, sink)
    }

    /// Build a worker around any model loader.
    pub fn with_loader(
        config: &CoreConfig,
        loader: Arc<dyn ModelLoader>,
        images: Arc<dyn ImageSource>,
        sink: Arc<dyn DurableSink>,
    ) -> std::io::Result<Self> {
        let cache = Arc::new(ResourceCache::new(loader, config.models.accelerator_count));

        let segmenter = Arc::new(YoloSegmenter::new(
            cache.clone(),
            config.models.class_names(ModelKind::Segmentation).to_vec(),
        ));
        let single_pass: Arc<dyn ObjectDetector> = Arc::new(YoloDetector::new(
            cache.clone(),
            config.models.class_names(ModelKind::Detection).to_vec(),
            config.detection.tile_size,
            config.detection.nms_iou,
        ));
        let detector = Arc::new(TiledDetector::new(single_pass, &config.detection));

        let coordinator = Arc::new(PipelineCoordinator::new(
            segmenter,
            detector,
            BandEstimator::new(config.estimation.clone()),
            images,
            config.segmentation.clone(),
            config.detection.confidence,
        ));

        let breaker = Arc::new(CircuitBreaker::new(&config.orchestration.breaker));
        let orchestrator = Orchestrator::new(coordinator, breaker, sink, &config.orchestration)?;

        log::info!(
            "Worker ready: {} accelerator worker(s), {} accelerator(s)",
            config.orchestration.gpu_workers.max(1),
            config.models.accelerator_count
        );
        Ok(Self {
            orchestrator,
            cache,
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Drain in-flight jobs, then release every model handle.
    pub fn shutdown(self) {
        let Self {
            orchestrator,
            cache,
        } = self;
        drop(orchestrator);
        cache.release_all();
        log::info!("Worker shut down");
    }
}
