//! Retry policy engine
//!
//! Runs an operation up to `max_attempts` times with exponential backoff.
//! An attempt fails when the operation errors or when the success predicate
//! rejects its result. The returned outcome is either the first success or
//! the last failure; the two are mutually exclusive.

use std::future::Future;
use std::time::Duration;

use msg_config::RetrySettings;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Wait after the first failed attempt
    pub initial_delay: Duration,
    /// Cap on the grown wait
    pub max_delay: Duration,
    /// Growth factor per failed attempt
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetrySettings::default().into()
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            multiplier: settings.multiplier,
        }
    }
}

/// Why the last attempt did not count as a success
#[derive(Debug)]
pub enum AttemptFailure<T, E> {
    /// The operation returned a result the predicate rejected
    Rejected(T),
    /// The operation itself failed
    Error(E),
}

#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { attempts: u32, last_failure: AttemptFailure<T, E> },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            multiplier: 2.0,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Wait after failed attempt number `attempt` (1-based):
    /// `initial_delay * multiplier^(attempt - 1)`, capped at `max_delay`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Every wait an exhausted run sleeps through, in order
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..self.max_attempts.max(1)).map(|attempt| self.delay_after(attempt))
    }

    /// Run `operation` until `is_success` accepts a result or attempts run out.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn execute<T, E, Op, Fut, P>(&self, mut operation: Op, is_success: P) -> RetryOutcome<T, E>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&T) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let failure = match operation(attempt).await {
                Ok(value) if is_success(&value) => {
                    return RetryOutcome::Succeeded { value, attempts: attempt };
                }
                Ok(value) => AttemptFailure::Rejected(value),
                Err(error) => AttemptFailure::Error(error),
            };

            if attempt >= max_attempts {
                return RetryOutcome::Exhausted {
                    attempts: attempt,
                    last_failure: failure,
                };
            }

            let delay = self.delay_after(attempt);
            debug!(
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
