// job/retry.rs
//
// Retry policy for transient pipeline failures: exponential backoff with
// jitter, bounded attempts. Only errors whose kind is retryable qualify;
// validation and media errors fail immediately.

use std::time::Duration;

use log::info;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// What to do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Requeue(Duration),
    Fail,
}

impl RetryPolicy {
    /// `attempt` is the number of attempts already made, starting at 1.
    pub fn decide(&self, error: &PipelineError, attempt: u32) -> RetryDecision {
        if !error.is_retryable() || attempt > self.max_retries {
            return RetryDecision::Fail;
        }
        let delay = self.backoff_delay(attempt);
        info!(
            "Retryable failure on attempt {}/{}, requeueing in {:?}: {}",
            attempt,
            self.max_retries + 1,
            delay,
            error
        );
        RetryDecision::Requeue(delay)
    }

    /// Exponential backoff capped at `max_delay`, with up to 25% jitter so
    /// simultaneous failures do not requeue in lockstep.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);
        base + jitter(base)
    }
}

fn jitter(base: Duration) -> Duration {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0) as u64;
    let quarter = base.as_millis() as u64 / 4;
    if quarter == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(nanos % quarter)
}
