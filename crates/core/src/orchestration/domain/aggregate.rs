use serde::{Deserialize, Serialize};

use crate::orchestration::domain::job::ImageDescriptor;
use crate::pipeline::domain::work_unit_result::WorkUnitResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Every unit succeeded.
    Completed,
    /// Some units succeeded.
    Warning,
    /// No unit succeeded.
    Failed,
}

/// Terminal state of one unit, as seen at the fan-in barrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UnitStatus {
    Succeeded(WorkUnitResult),
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub image: ImageDescriptor,
    pub status: UnitStatus,
}

impl UnitOutcome {
    pub fn result(&self) -> Option<&WorkUnitResult> {
        match &self.status {
            UnitStatus::Succeeded(r) => Some(r),
            UnitStatus::Failed { .. } => None,
        }
    }
}

/// Job-level summary, built once after every unit has resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAggregate {
    pub job_id: String,
    pub units_submitted: usize,
    pub units_succeeded: usize,
    pub total_detected: u64,
    pub total_estimated: u64,
    /// Unweighted mean of the succeeded units' average confidence.
    pub avg_confidence: f64,
    pub final_status: JobStatus,
}

/// Fold the unit outcomes of a job. Failed units only count as submitted.
pub fn aggregate(job_id: &str, outcomes: &[UnitOutcome]) -> JobAggregate {
    let succeeded: Vec<&WorkUnitResult> = outcomes.iter().filter_map(UnitOutcome::result).collect();

    let avg_confidence = if succeeded.is_empty() {
        0.0
    } else {
        succeeded.iter().map(|r| r.avg_confidence).sum::<f64>() / succeeded.len() as f64
    };

    let final_status = if succeeded.is_empty() {
        JobStatus::Failed
    } else if succeeded.len() == outcomes.len() {
        JobStatus::Completed
    } else {
        JobStatus::Warning
    };

    JobAggregate {
        job_id: job_id.to_string(),
        units_submitted: outcomes.len(),
        units_succeeded: succeeded.len(),
        total_detected: succeeded.iter().map(|r| r.total_detected).sum(),
        total_estimated: succeeded.iter().map(|r| r.total_estimated).sum(),
        avg_confidence,
        final_status,
    }
}
