use log::{error, info, warn};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum Attempt<T, E> {
    Success(T),
    Retryable(E),
    Terminal(E),
}

/// Last failure of a retried operation.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub error: E,
    pub attempts: u32,
    /// True when the retry budget ran out, false when a terminal error stopped the loop.
    pub exhausted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before attempt `attempt` (1-based): none before the first,
    /// then base, 2x base, 4x base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `operation` until it succeeds, fails terminally, or the budget
    /// of `max_retries + 1` attempts is spent. The closure receives the
    /// 1-based attempt number.
    pub async fn execute<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, RetryFailure<E>>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Attempt::Success(value) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}/{}", label, attempt, max_attempts);
                    }
                    return Ok(value);
                }
                Attempt::Terminal(err) => {
                    return Err(RetryFailure {
                        error: err,
                        attempts: attempt,
                        exhausted: false,
                    });
                }
                Attempt::Retryable(err) => {
                    if attempt >= max_attempts {
                        error!("{} failed after {} attempt(s): {}", label, attempt, err);
                        return Err(RetryFailure {
                            error: err,
                            attempts: attempt,
                            exhausted: true,
                        });
                    }
                    let delay = self.backoff(attempt + 1);
                    warn!(
                        "{} attempt {}/{} failed: {}; retrying in {:?}",
                        label, attempt, max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
