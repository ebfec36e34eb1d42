use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::shared::config::BreakerConfig;
use crate::shared::error::CircuitBreakerOpenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of the breaker, for health reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerState {
    pub failure_count: u32,
    pub last_failure_time: Option<Instant>,
    pub state: BreakerState,
}

/// How a job got past the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Normal,
    /// The single trial job admitted after the cooldown. Its outcome must be
    /// reported through [`CircuitBreaker::finish_probe`].
    Probe,
}

struct Inner {
    failure_count: u32,
    last_failure: Option<Instant>,
    state: BreakerState,
    probe_in_flight: bool,
}

/// Process-wide fail-fast guard in front of job dispatch.
///
/// Closed admits everything and counts failures. Reaching the threshold opens
/// it; while open every job is rejected until the cooldown has elapsed since
/// the last failure, after which exactly one probe job is admitted
/// (HalfOpen). The probe's outcome closes or re-opens the breaker.
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cooldown: Duration::from_secs(config.cooldown_secs),
            inner: Mutex::new(Inner {
                failure_count: 0,
                last_failure: None,
                state: BreakerState::Closed,
                probe_in_flight: false,
            }),
        }
    }

    /// Admission check for a new job.
    pub fn try_acquire(&self) -> Result<Admission, CircuitBreakerOpenError> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Ok(Admission::Normal),
            BreakerState::HalfOpen => Err(CircuitBreakerOpenError {
                retry_after: self.cooldown,
            }),
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(self.cooldown);
                if elapsed >= self.cooldown && !inner.probe_in_flight {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    log::info!("Circuit breaker half-open; admitting probe job");
                    Ok(Admission::Probe)
                } else {
                    Err(CircuitBreakerOpenError {
                        retry_after: self.cooldown.saturating_sub(elapsed),
                    })
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == BreakerState::Closed {
            inner.failure_count = 0;
        }
        // Open: stragglers from before the trip do not close it.
        // HalfOpen: only the probe job's outcome decides, in `finish_probe`.
    }

    /// Counts the failure. Only a closed breaker changes state here; while
    /// half-open, failures are tallied and the probe job's outcome decides.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        if inner.state == BreakerState::Closed && inner.failure_count >= self.failure_threshold {
            inner.state = BreakerState::Open;
            log::warn!(
                "Circuit breaker opened after {} failure(s); rejecting jobs for {:?}",
                inner.failure_count,
                self.cooldown
            );
        }
    }

    /// End of the probe job: a job with at least one succeeded unit closes the
    /// breaker, anything else re-opens it for another cooldown.
    pub fn finish_probe(&self, job_succeeded: bool) {
        let mut inner = self.lock();
        inner.probe_in_flight = false;
        if inner.state != BreakerState::HalfOpen {
            return;
        }
        if job_succeeded {
            inner.state = BreakerState::Closed;
            inner.failure_count = 0;
            log::info!("Circuit breaker closed after successful probe");
        } else {
            inner.state = BreakerState::Open;
            inner.last_failure = Some(Instant::now());
            log::warn!("Circuit breaker re-opened: probe job failed");
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerState {
        let inner = self.lock();
        CircuitBreakerState {
            failure_count: inner.failure_count,
            last_failure_time: inner.last_failure,
            state: inner.state,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
