//! Exponential backoff around a single fallible fetch attempt.

use crate::http::errors::FetchError;
use crate::utils::fmt_duration;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How many times to try a request and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Wait after the first failure; doubles after each further failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

/// Run `op` until it succeeds, fails permanently, or the attempts run out.
///
/// `op` receives the 1-based attempt number. `sleep` is awaited between
/// attempts; production code passes `tokio::time::sleep`. The last error is
/// returned on exhaustion.
pub async fn retry_with_backoff<T, Op, Fut, Sleep, SleepFut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: Op,
    mut sleep: Sleep,
) -> Result<T, FetchError>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
    Sleep: FnMut(Duration) -> SleepFut,
    SleepFut: Future<Output = ()>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt >= attempts || !err.is_retryable() {
            return Err(err);
        }

        let wait = policy.delay_after(attempt);
        warn!(
            attempt,
            attempts,
            wait = fmt_duration(wait),
            url = label,
            error = %err,
            "Request failed, retrying"
        );
        sleep(wait).await;
        attempt += 1;
    }
}
