use serde::{Deserialize, Serialize};

use crate::estimation::band_estimator::BandEstimate;
use crate::orchestration::domain::aggregate::{JobAggregate, UnitOutcome, UnitStatus};
use crate::shared::detection::Detection;
use crate::shared::error::SinkError;

/// Per-image records persisted alongside the job aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub external_image_id: String,
    pub spatial_context_id: String,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
    pub detections: Vec<Detection>,
    pub band_estimates: Vec<BandEstimate>,
}

/// Payload handed to the durable sink once per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub aggregate: JobAggregate,
    pub units: Vec<UnitRecord>,
}

impl JobRecord {
    pub fn new(aggregate: JobAggregate, outcomes: &[UnitOutcome]) -> Self {
        let units = outcomes
            .iter()
            .map(|o| {
                let (succeeded, failure_reason, detections, band_estimates) = match &o.status {
                    UnitStatus::Succeeded(r) => {
                        (true, None, r.detections.clone(), r.band_estimates.clone())
                    }
                    UnitStatus::Failed { reason } => {
                        (false, Some(reason.clone()), Vec::new(), Vec::new())
                    }
                };
                UnitRecord {
                    external_image_id: o.image.external_image_id.clone(),
                    spatial_context_id: o.image.spatial_context_id.clone(),
                    succeeded,
                    failure_reason,
                    detections,
                    band_estimates,
                }
            })
            .collect();
        Self { aggregate, units }
    }
}

/// Persistent store for finished jobs.
pub trait DurableSink: Send + Sync {
    fn persist(&self, record: &JobRecord) -> Result<(), SinkError>;
}
