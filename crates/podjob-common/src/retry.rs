//! Retry with exponential backoff and jitter
//!
//! Used for reads against the API server that may fail transiently while a
//! job is running, such as (re)establishing a watch. Submission is never
//! routed through here: a job name is generated once per invocation and a
//! blind resubmit could create a second job.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Backoff settings for a retried operation
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Retry up to `attempts` times in total
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Retry until the operation succeeds or fails permanently
    pub fn infinite() -> Self {
        Self::default()
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Run `operation` until it succeeds, retrying errors accepted by `should_retry`.
///
/// Errors rejected by `should_retry` are returned immediately. Accepted errors
/// are retried with jittered exponential backoff until `max_attempts` is
/// reached (never, when it is 0).
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        let e = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !should_retry(&e) {
            return Err(e);
        }

        if config.exhausted(attempt) {
            error!(
                operation = %operation_name,
                attempt,
                error = %e,
                "operation failed after max retries"
            );
            return Err(e);
        }

        // 0.5x to 1.5x of the nominal delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

        warn!(
            operation = %operation_name,
            attempt,
            error = %e,
            delay_ms = jittered.as_millis() as u64,
            "operation failed, retrying"
        );

        tokio::time::sleep(jittered).await;

        delay = Duration::from_secs_f64(
            (delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay.as_secs_f64()),
        );
    }
}
