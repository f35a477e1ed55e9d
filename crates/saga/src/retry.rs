//! Bounded exponential backoff for step and compensation calls.

use std::time::Duration;

use rand::Rng;

use crate::invoker::{StepCall, StepInvoker, StepOutcome};

/// Retry policy for remote calls.
///
/// Attempt `n` (1-based) backs off `base_delay * 2^(n-1)`, capped at
/// `max_delay`, with equal jitter. Exceeding `max_attempts` escalates the
/// last retryable failure to a permanent one.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy with no backoff, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Returns the backoff delay after a failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.max_delay);
        if capped.is_zero() {
            return Duration::ZERO;
        }

        // Equal jitter: half fixed, half random.
        let half = capped / 2;
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..=half);
        half + jitter
    }
}

/// Drives one step action (forward or compensating) through the retry
/// policy.
///
/// Each attempt is bounded by `call_timeout`; an elapsed timeout counts as
/// a retryable failure. The returned outcome is never
/// `RetryableFailure` — exhausted retries come back as
/// `PermanentFailure`.
pub(crate) async fn run_with_retry<I: StepInvoker + ?Sized>(
    invoker: &I,
    call: &StepCall,
    policy: &RetryPolicy,
    call_timeout: Duration,
    compensating: bool,
) -> StepOutcome {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let action = if compensating {
            invoker.compensate(call)
        } else {
            invoker.invoke(call)
        };

        let outcome = match tokio::time::timeout(call_timeout, action).await {
            Ok(outcome) => outcome,
            Err(_) => {
                StepOutcome::RetryableFailure(format!("call timed out after {call_timeout:?}"))
            }
        };

        match outcome {
            StepOutcome::RetryableFailure(reason) => {
                if attempt >= policy.max_attempts {
                    return StepOutcome::PermanentFailure(format!(
                        "retries exhausted after {attempt} attempts: {reason}"
                    ));
                }
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    step = %call.step_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %reason,
                    "retryable step failure; backing off"
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}
