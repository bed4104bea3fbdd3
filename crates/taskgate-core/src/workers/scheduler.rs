//! Retry loop around [`Worker`]s.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::{WorkContext, WorkOutcome, Worker};

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per round, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        if secs.is_finite() && secs < MAX_BACKOFF.as_secs_f64() {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            MAX_BACKOFF
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkReport {
    pub worker: &'static str,
    pub outcome: WorkOutcome,
    pub attempts: u32,
}

/// Runs workers off the async executor and retries them per policy.
#[derive(Debug, Clone)]
pub struct WorkScheduler {
    policy: RetryPolicy,
}

impl WorkScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `worker` until it succeeds, fails terminally, or attempts run out.
    /// Exhausted retries are reported as [`WorkOutcome::Failure`].
    pub async fn run(&self, worker: Arc<dyn Worker>) -> WorkReport {
        let name = worker.name();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let ctx = WorkContext { attempt };
            let job = worker.clone();
            let outcome = match tokio::task::spawn_blocking(move || job.run(&ctx)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(worker = name, error = %e, "worker panicked");
                    WorkOutcome::Retry
                }
            };

            match outcome {
                WorkOutcome::Success | WorkOutcome::Failure => {
                    info!(worker = name, ?outcome, attempts = attempt, "worker finished");
                    return WorkReport {
                        worker: name,
                        outcome,
                        attempts: attempt,
                    };
                }
                WorkOutcome::Retry if attempt >= max_attempts => {
                    warn!(worker = name, attempts = attempt, "worker out of retries");
                    return WorkReport {
                        worker: name,
                        outcome: WorkOutcome::Failure,
                        attempts: attempt,
                    };
                }
                WorkOutcome::Retry => {
                    let delay = self.policy.backoff_after(attempt);
                    info!(worker = name, attempt, delay_ms = delay.as_millis() as u64, "worker will retry");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Run workers one after another.
    pub async fn run_all(&self, workers: &[Arc<dyn Worker>]) -> Vec<WorkReport> {
        let mut reports = Vec::with_capacity(workers.len());
        for worker in workers {
            reports.push(self.run(worker.clone()).await);
        }
        reports
    }
}
