use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crate::orchestration::circuit_breaker::CircuitBreaker;
use crate::shared::config::RetryConfig;
use crate::shared::error::UnitError;

/// Receives the outcome of every attempt.
pub trait FailureTracker {
    fn record_success(&self);
    fn record_failure(&self);
}

impl FailureTracker for CircuitBreaker {
    fn record_success(&self) {
        CircuitBreaker::record_success(self);
    }

    fn record_failure(&self) {
        CircuitBreaker::record_failure(self);
    }
}

/// Bounded retry with exponential backoff around one unit of work.
///
/// Every retry and every permanent failure is reported to the tracker, a
/// success resets it. A panic inside the work counts as a transient failure.
/// Missing input and resource load failures end the unit at once.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff before retry number `retry` (1-based): base, 2×base, 4×base, ...
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    pub fn run<T>(
        &self,
        tracker: &impl FailureTracker,
        label: &str,
        mut op: impl FnMut() -> Result<T, UnitError>,
    ) -> Result<T, UnitError> {
        let mut retry = 0;
        loop {
            let attempt = panic::catch_unwind(AssertUnwindSafe(&mut op)).unwrap_or_else(|payload| {
                Err(UnitError::TransientProcessing(format!(
                    "unit panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
            match attempt {
                Ok(value) => {
                    tracker.record_success();
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && retry < self.max_retries => {
                    retry += 1;
                    tracker.record_failure();
                    let delay = self.delay_for(retry);
                    log::warn!(
                        "{label}: attempt {retry} failed ({e}); retrying in {:?}",
                        delay
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => {
                    tracker.record_failure();
                    log::error!("{label}: permanently failed after {retry} retries: {e}");
                    return Err(e);
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload")
}
