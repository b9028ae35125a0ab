//! Polling controller for submit-then-poll providers
//!
//! Asynchronous providers answer a submission with a job handle. The
//! controller repeatedly sleeps, runs a status check and stops on the first
//! terminal state, on cancellation, or after a fixed number of checks.

use crate::providers::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cadence of status checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Delay before every status check
    pub interval: Duration,

    /// Number of status checks before giving up
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Quick image jobs: 4 s × 15 checks
    pub fn fast_image() -> Self {
        Self::new(Duration::from_secs(4), 15)
    }

    /// Default cadence: 5 s × 36 checks
    pub fn standard() -> Self {
        Self::new(Duration::from_secs(5), 36)
    }

    /// Video jobs: 10 s × 60 checks
    pub fn long_video() -> Self {
        Self::new(Duration::from_secs(10), 60)
    }

    /// Upper bound on the time spent sleeping
    pub fn max_wait(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Result of one status check
#[derive(Debug, Clone, PartialEq)]
pub enum PollState<T> {
    /// The remote job is still running
    Pending,
    /// The remote job reached a terminal state
    Done(T),
}

/// Terminal value plus bookkeeping about how long it took
#[derive(Debug, Clone)]
pub struct PollOutcome<T> {
    pub value: T,

    /// Number of status checks performed, including the terminal one
    pub attempts: u32,

    /// Wall time spent polling
    pub elapsed: Duration,
}

/// Drives status checks according to a [`PollPolicy`]
#[derive(Debug, Clone)]
pub struct PollingController {
    policy: PollPolicy,
}

impl PollingController {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Poll until `check` reports a terminal state
    ///
    /// `check` receives the 1-based attempt number. Errors returned by
    /// `check` stop polling immediately. Cancellation is observed before and
    /// during every sleep.
    pub async fn poll<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        mut check: F,
    ) -> Result<PollOutcome<T>, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<PollState<T>, ProviderError>>,
    {
        let start_time = Instant::now();

        for attempt in 1..=self.policy.max_attempts {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(self.policy.interval) => {}
            }

            match check(attempt).await? {
                PollState::Done(value) => {
                    return Ok(PollOutcome {
                        value,
                        attempts: attempt,
                        elapsed: start_time.elapsed(),
                    });
                }
                PollState::Pending => {
                    debug!(
                        "Job still pending after check {}/{}",
                        attempt, self.policy.max_attempts
                    );
                }
            }
        }

        Err(ProviderError::Timeout {
            attempts: self.policy.max_attempts,
        })
    }
}
