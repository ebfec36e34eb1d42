use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::orchestration::circuit_breaker::{Admission, CircuitBreaker};
use crate::orchestration::domain::aggregate::{aggregate, JobAggregate, UnitOutcome, UnitStatus};
use crate::orchestration::domain::durable_sink::{DurableSink, JobRecord};
use crate::orchestration::domain::job::{ImageDescriptor, JobSubmission};
use crate::orchestration::domain::unit_runner::UnitRunner;
use crate::orchestration::infrastructure::worker_pool::WorkerPool;
use crate::orchestration::retry_policy::{FailureTracker, RetryPolicy};
use crate::pipeline::domain::work_unit_result::WorkUnitResult;
use crate::shared::config::OrchestrationConfig;
use crate::shared::error::{CircuitBreakerOpenError, UnitError};

/// Terminal result of a job: the aggregate plus every unit's outcome, in
/// submission order.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub aggregate: JobAggregate,
    pub outcomes: Vec<UnitOutcome>,
}

/// Returned by [`Orchestrator::submit`] as soon as the job is accepted.
pub struct JobAck {
    pub job_id: String,
    report: Receiver<JobReport>,
}

impl JobAck {
    /// Block until the job reaches a terminal state. `None` only if the
    /// orchestrator shut down before aggregating.
    pub fn wait(self) -> Option<JobReport> {
        self.report.recv().ok()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<JobReport> {
        self.report.recv_timeout(timeout).ok()
    }
}

/// Progress of one dispatched unit, as seen by its aggregator.
enum UnitEvent {
    /// A worker picked the unit up; the unit timeout runs from here.
    Started,
    /// The worker's slot is out of service; the unit did not run.
    Refused,
    Finished(Result<WorkUnitResult, UnitError>),
}

/// The aggregator's end of one dispatched unit.
struct UnitSlot {
    events: Receiver<UnitEvent>,
    abandoned: Arc<AtomicBool>,
}

/// Breaker feedback from one unit, silenced once its aggregator gave up on it.
struct UnitFeedback<'a> {
    breaker: &'a CircuitBreaker,
    abandoned: &'a AtomicBool,
}

impl FailureTracker for UnitFeedback<'_> {
    fn record_success(&self) {
        if !self.abandoned.load(Ordering::SeqCst) {
            self.breaker.record_success();
        }
    }

    fn record_failure(&self) {
        if !self.abandoned.load(Ordering::SeqCst) {
            self.breaker.record_failure();
        }
    }
}

struct Shared {
    runner: Arc<dyn UnitRunner>,
    breaker: Arc<CircuitBreaker>,
    sink: Arc<dyn DurableSink>,
    retry: RetryPolicy,
    unit_timeout: Option<Duration>,
    /// Accelerator slots taken out of service after a resource load failure.
    dead_slots: Vec<AtomicBool>,
}

impl Shared {
    fn healthy_slots(&self) -> usize {
        self.dead_slots
            .iter()
            .filter(|dead| !dead.load(Ordering::SeqCst))
            .count()
    }

    fn slot_is_dead(&self, slot: usize) -> bool {
        self.dead_slots
            .get(slot)
            .is_some_and(|dead| dead.load(Ordering::SeqCst))
    }

    fn retire_slot(&self, slot: usize) {
        if let Some(dead) = self.dead_slots.get(slot) {
            if !dead.swap(true, Ordering::SeqCst) {
                log::error!(
                    "Accelerator slot {slot} taken out of service; {} healthy slot(s) left",
                    self.healthy_slots()
                );
            }
        }
    }
}

/// Admits jobs, fans units out to the accelerator pool and fans the outcomes
/// back in for aggregation.
///
/// Layout: `submit → [compute] entry → [gpu] unit × N → [compute] aggregate → sink`
pub struct Orchestrator {
    shared: Arc<Shared>,
    // dropped before `gpu_pool` so in-flight jobs can still dispatch
    compute_pool: WorkerPool,
    gpu_pool: Arc<WorkerPool>,
}

impl Orchestrator {
    pub fn new(
        runner: Arc<dyn UnitRunner>,
        breaker: Arc<CircuitBreaker>,
        sink: Arc<dyn DurableSink>,
        config: &OrchestrationConfig,
    ) -> std::io::Result<Self> {
        Self::with_unit_timeout(runner, breaker, sink, config, config.unit_timeout())
    }

    fn with_unit_timeout(
        runner: Arc<dyn UnitRunner>,
        breaker: Arc<CircuitBreaker>,
        sink: Arc<dyn DurableSink>,
        config: &OrchestrationConfig,
        unit_timeout: Option<Duration>,
    ) -> std::io::Result<Self> {
        let gpu_pool = WorkerPool::new("gpu", config.gpu_workers)?;
        let dead_slots = (0..gpu_pool.size()).map(|_| AtomicBool::new(false)).collect();
        Ok(Self {
            shared: Arc::new(Shared {
                runner,
                breaker,
                sink,
                retry: RetryPolicy::new(&config.retry),
                unit_timeout,
                dead_slots,
            }),
            compute_pool: WorkerPool::new("compute", config.effective_compute_workers())?,
            gpu_pool: Arc::new(gpu_pool),
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.shared.breaker
    }

    /// Accelerator slots still in service.
    pub fn healthy_accelerator_slots(&self) -> usize {
        self.shared.healthy_slots()
    }

    /// Accept a job for asynchronous processing.
    ///
    /// Rejected without dispatching anything while the breaker is open.
    pub fn submit(&self, job: JobSubmission) -> Result<JobAck, CircuitBreakerOpenError> {
        let admission = self.shared.breaker.try_acquire().map_err(|e| {
            log::warn!("Rejected job {}: {e}", job.job_id);
            e
        })?;
        log::info!(
            "Received job {} with {} image(s){}",
            job.job_id,
            job.images.len(),
            if admission == Admission::Probe {
                " as breaker probe"
            } else {
                ""
            }
        );

        let (report_tx, report_rx) = crossbeam_channel::bounded(1);
        let job_id = job.job_id.clone();
        let shared = self.shared.clone();
        let gpu_pool = self.gpu_pool.clone();

        let queued = self.compute_pool.execute(move |_| {
            let report = run_job(&shared, &gpu_pool, job);
            if admission == Admission::Probe {
                shared.breaker.finish_probe(report.aggregate.units_succeeded > 0);
            }
            let _ = report_tx.send(report);
        });
        if !queued {
            log::error!("Compute pool is shut down; job {job_id} dropped");
            if admission == Admission::Probe {
                self.shared.breaker.finish_probe(false);
            }
        }

        Ok(JobAck {
            job_id,
            report: report_rx,
        })
    }
}

fn run_job(shared: &Arc<Shared>, gpu_pool: &WorkerPool, job: JobSubmission) -> JobReport {
    let start = Instant::now();
    let JobSubmission { job_id, images } = job;

    let slots: Vec<(ImageDescriptor, Option<UnitSlot>)> = images
        .into_iter()
        .map(|image| {
            let slot = dispatch_unit(shared, gpu_pool, &job_id, &image);
            (image, slot)
        })
        .collect();
    log::info!("Dispatched {} unit(s) for job {job_id}", slots.len());

    let outcomes: Vec<UnitOutcome> = slots
        .into_iter()
        .map(|(image, slot)| {
            let status = match slot {
                Some(slot) => await_unit(shared, gpu_pool, &job_id, &image, slot),
                None => UnitStatus::Failed {
                    reason: "accelerator pool unavailable".into(),
                },
            };
            UnitOutcome { image, status }
        })
        .collect();

    let aggregate = aggregate(&job_id, &outcomes);
    log::info!(
        "Job {job_id} {:?}: {}/{} unit(s) succeeded, {} detected, {} estimated in {:.2}s",
        aggregate.final_status,
        aggregate.units_succeeded,
        aggregate.units_submitted,
        aggregate.total_detected,
        aggregate.total_estimated,
        start.elapsed().as_secs_f64()
    );

    let record = JobRecord::new(aggregate.clone(), &outcomes);
    if let Err(e) = shared.sink.persist(&record) {
        log::error!("Failed to persist job {job_id}: {e}");
    }

    JobReport {
        aggregate,
        outcomes,
    }
}

/// Queue one unit on the accelerator pool. `None` if the pool is shut down.
fn dispatch_unit(
    shared: &Arc<Shared>,
    gpu_pool: &WorkerPool,
    job_id: &str,
    image: &ImageDescriptor,
) -> Option<UnitSlot> {
    // at most Started plus one terminal event, so sends never block
    let (tx, rx) = crossbeam_channel::bounded(2);
    let abandoned = Arc::new(AtomicBool::new(false));
    let task_shared = shared.clone();
    let task_abandoned = abandoned.clone();
    let image = image.clone();
    let label = format!("job {job_id} image {}", image.external_image_id);

    let queued = gpu_pool.execute(move |slot| {
        let shared = task_shared;
        if shared.slot_is_dead(slot) {
            let _ = tx.send(UnitEvent::Refused);
            return;
        }
        // the aggregator may have given up on this unit already
        let _ = tx.send(UnitEvent::Started);
        let feedback = UnitFeedback {
            breaker: &shared.breaker,
            abandoned: &task_abandoned,
        };
        let result = shared
            .retry
            .run(&feedback, &label, || shared.runner.run(&image, slot));
        if let Err(UnitError::ResourceLoad(e)) = &result {
            log::error!("{label}: accelerator slot {slot} cannot load its models: {e}");
            shared.retire_slot(slot);
        }
        let _ = tx.send(UnitEvent::Finished(result));
    });
    queued.then(|| UnitSlot {
        events: rx,
        abandoned,
    })
}

/// Wait for one unit's terminal outcome.
///
/// The unit timeout starts when a worker picks the unit up, not while it
/// waits in the accelerator queue. A unit its slot could not run is sent
/// back to the pool while any slot is still in service.
fn await_unit(
    shared: &Arc<Shared>,
    gpu_pool: &WorkerPool,
    job_id: &str,
    image: &ImageDescriptor,
    mut slot: UnitSlot,
) -> UnitStatus {
    let mut deadline: Option<Instant> = None;
    loop {
        let received = match deadline {
            Some(deadline) => slot.events.recv_deadline(deadline),
            None => slot
                .events
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(UnitEvent::Started) => {
                deadline = shared
                    .unit_timeout
                    .and_then(|timeout| Instant::now().checked_add(timeout));
                continue;
            }
            Ok(UnitEvent::Finished(Ok(result))) => return UnitStatus::Succeeded(result),
            Ok(UnitEvent::Finished(Err(e @ UnitError::ResourceLoad(_)))) => {
                if shared.healthy_slots() == 0 {
                    return UnitStatus::Failed {
                        reason: e.to_string(),
                    };
                }
            }
            Ok(UnitEvent::Finished(Err(e))) => {
                return UnitStatus::Failed {
                    reason: e.to_string(),
                }
            }
            Ok(UnitEvent::Refused) => {
                if shared.healthy_slots() == 0 {
                    return UnitStatus::Failed {
                        reason: "no accelerator slot in service".into(),
                    };
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                log::error!(
                    "Job {job_id}: image {} timed out; marking failed",
                    image.external_image_id
                );
                slot.abandoned.store(true, Ordering::SeqCst);
                shared.breaker.record_failure();
                return UnitStatus::Failed {
                    reason: "unit timed out".into(),
                };
            }
            Err(RecvTimeoutError::Disconnected) => {
                log::error!(
                    "Job {job_id}: image {} worker exited without a result",
                    image.external_image_id
                );
                shared.breaker.record_failure();
                return UnitStatus::Failed {
                    reason: "worker exited without a result".into(),
                };
            }
        }
        log::warn!(
            "Job {job_id}: re-dispatching image {} to a healthy accelerator slot",
            image.external_image_id
        );
        slot = match dispatch_unit(shared, gpu_pool, job_id, image) {
            Some(next) => next,
            None => {
                return UnitStatus::Failed {
                    reason: "accelerator pool unavailable".into(),
                }
            }
        };
        deadline = None;
    }
}
