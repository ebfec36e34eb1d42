use crate::orchestration::domain::job::ImageDescriptor;
use crate::pipeline::domain::work_unit_result::WorkUnitResult;
use crate::shared::error::UnitError;

/// Entry point for one unit of work, executed on a GPU worker.
///
/// `slot` identifies the worker so per-worker resources (model handles,
/// device binding) are reused across units.
pub trait UnitRunner: Send + Sync {
    fn run(&self, image: &ImageDescriptor, slot: usize) -> Result<WorkUnitResult, UnitError>;
}
