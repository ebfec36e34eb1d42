use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use plantcount_core::orchestration::circuit_breaker::{BreakerState, CircuitBreaker};
use plantcount_core::orchestration::domain::aggregate::{JobStatus, UnitStatus};
use plantcount_core::orchestration::domain::durable_sink::{DurableSink, JobRecord};
use plantcount_core::orchestration::domain::job::{ImageDescriptor, JobSubmission};
use plantcount_core::orchestration::domain::unit_runner::UnitRunner;
use plantcount_core::orchestration::orchestrator::Orchestrator;
use plantcount_core::pipeline::domain::work_unit_result::WorkUnitResult;
use plantcount_core::shared::config::{BreakerConfig, OrchestrationConfig, RetryConfig};
use plantcount_core::shared::detection::Detection;
use plantcount_core::shared::error::{SinkError, UnitError};

/// Locators name the behaviour: `ok:<n>` yields n detections at 0.8,
/// `flaky` always fails transiently, `missing` has no input.
struct ScriptedRunner {
    calls: AtomicUsize,
}

impl ScriptedRunner {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl UnitRunner for ScriptedRunner {
    fn run(&self, image: &ImageDescriptor, _slot: usize) -> Result<WorkUnitResult, UnitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match image.readable_locator.as_str() {
            "flaky" => Err(UnitError::TransientProcessing("CUDA out of memory".into())),
            "missing" => Err(UnitError::MissingInput("missing".into())),
            other => {
                let n: usize = other.trim_start_matches("ok:").parse().unwrap_or(0);
                let detections = (0..n)
                    .map(|i| {
                        let x = i as f64 * 10.0;
                        Detection::from_corners([x, 0.0, x + 5.0, 5.0], 0.8, "plant")
                    })
                    .collect();
                Ok(WorkUnitResult::from_parts(detections, Vec::new(), 1, 0.01))
            }
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    records: Mutex<Vec<JobRecord>>,
}

impl DurableSink for RecordingSink {
    fn persist(&self, record: &JobRecord) -> Result<(), SinkError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

fn config(failure_threshold: u32) -> OrchestrationConfig {
    OrchestrationConfig {
        gpu_workers: 1,
        compute_workers: 2,
        unit_timeout_secs: Some(30),
        retry: RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
        },
        breaker: BreakerConfig {
            failure_threshold,
            cooldown_secs: 300,
        },
    }
}

fn job(id: &str, locators: &[&str]) -> JobSubmission {
    JobSubmission {
        job_id: id.to_string(),
        images: locators
            .iter()
            .enumerate()
            .map(|(i, locator)| ImageDescriptor {
                external_image_id: format!("{id}-{}", i + 1),
                readable_locator: locator.to_string(),
                spatial_context_id: "greenhouse-2/bench-4".into(),
            })
            .collect(),
    }
}

#[test]
fn test_partial_failure_reports_warning_with_surviving_counts() {
    let runner = ScriptedRunner::new();
    let sink = Arc::new(RecordingSink::default());
    let cfg = config(5);
    let breaker = Arc::new(CircuitBreaker::new(&cfg.breaker));
    let orchestrator = Orchestrator::new(runner.clone(), breaker, sink.clone(), &cfg).unwrap();

    let report = orchestrator
        .submit(job("job-a", &["ok:4", "flaky", "ok:6"]))
        .unwrap()
        .wait()
        .unwrap();

    let agg = &report.aggregate;
    assert_eq!(agg.final_status, JobStatus::Warning);
    assert_eq!(agg.units_submitted, 3);
    assert_eq!(agg.units_succeeded, 2);
    assert_eq!(agg.total_detected, 10);
    assert!((agg.avg_confidence - 0.8).abs() < 1e-9);
    assert!(matches!(report.outcomes[1].status, UnitStatus::Failed { .. }));
    // one attempt plus three retries for the flaky image
    assert_eq!(runner.calls(), 6);

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].units.len(), 3);
    assert!(!records[0].units[1].succeeded);
    assert_eq!(records[0].units[2].detections.len(), 6);
}

#[test]
fn test_consecutive_failures_open_breaker_and_reject_without_dispatch() {
    let runner = ScriptedRunner::new();
    let cfg = config(5);
    let breaker = Arc::new(CircuitBreaker::new(&cfg.breaker));
    let orchestrator = Orchestrator::new(
        runner.clone(),
        breaker.clone(),
        Arc::new(RecordingSink::default()),
        &cfg,
    )
    .unwrap();

    for i in 0..5 {
        let report = orchestrator
            .submit(job(&format!("bad-{i}"), &["missing"]))
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(report.aggregate.final_status, JobStatus::Failed);
    }
    assert_eq!(breaker.snapshot().state, BreakerState::Open);

    let rejected = orchestrator.submit(job("sixth", &["ok:1"]));

    assert!(rejected.is_err());
    assert_eq!(runner.calls(), 5);
}

#[test]
fn test_all_units_succeeding_completes_and_resets_failures() {
    let runner = ScriptedRunner::new();
    let cfg = config(5);
    let breaker = Arc::new(CircuitBreaker::new(&cfg.breaker));
    let orchestrator = Orchestrator::new(
        runner,
        breaker.clone(),
        Arc::new(RecordingSink::default()),
        &cfg,
    )
    .unwrap();

    orchestrator
        .submit(job("one-bad", &["missing"]))
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(breaker.snapshot().failure_count, 1);

    let report = orchestrator
        .submit(job("good", &["ok:2", "ok:3"]))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(report.aggregate.final_status, JobStatus::Completed);
    assert_eq!(report.aggregate.total_detected, 5);
    assert_eq!(breaker.snapshot().failure_count, 0);
}
