//! Retry policy and the bounded retry loop for network operations.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ErrorKind};

/// Additional attempts allowed after the first one, unless configured otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay before the first retry.
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound of the exponential part of the delay.
pub const MAX_DELAY: Duration = Duration::from_secs(10);

/// Largest random addition, as a fraction of the exponential delay.
pub const JITTER_RATIO: f64 = 0.2;

/// Largest jitter ratio `backoff` honours; larger values, infinity included,
/// are capped to it.
pub const MAX_JITTER_RATIO: f64 = 1.0;

/// Decides whether a failed attempt is retried and how long to wait first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
            jitter_ratio: JITTER_RATIO,
        }
    }

    /// Total number of attempts a logical call may issue.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// `retries_done` is the number of retries already issued in this call.
    pub fn should_retry(&self, kind: ErrorKind, retries_done: u32) -> bool {
        kind.is_retryable() && retries_done < self.max_retries
    }

    /// Delay before retry `retry` (0-indexed) without jitter:
    /// `min(base_delay * 2^retry, max_delay)`.
    pub fn delay_ceiling(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay before retry `retry`, with up to `jitter_ratio` of it added at random.
    /// The ratio is capped at [`MAX_JITTER_RATIO`].
    pub fn backoff(&self, retry: u32) -> Duration {
        let delay = self.delay_ceiling(retry);
        if self.jitter_ratio.is_nan() || self.jitter_ratio <= 0.0 {
            return delay;
        }
        let ratio = self.jitter_ratio.min(MAX_JITTER_RATIO);
        let jitter = rand::thread_rng().gen_range(0.0..=ratio);
        delay.saturating_add(delay.mul_f64(jitter))
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// exhausts `policy`.
///
/// Each attempt and each backoff sleep race against `cancel`. A call cancelled
/// mid-attempt reports [`ErrorKind::Cancelled`]; the interrupted request may or
/// may not have reached upstream, so it is never retried.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let total = policy.max_attempts();

    if cancel.is_cancelled() {
        return Err(ApiError::cancelled(format!(
            "{}: cancelled before any request was sent",
            operation_name
        )));
    }

    let mut attempts: u32 = 0;
    loop {
        attempts += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("{}: cancelled during attempt {}/{}", operation_name, attempts, total);
                return Err(ApiError::cancelled(format!(
                    "{}: cancelled during attempt {}/{}; upstream outcome unknown",
                    operation_name, attempts, total
                ))
                .with_attempts(attempts));
            }
            outcome = operation() => outcome,
        };

        let error = match outcome {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        let retries_done = attempts - 1;
        if !policy.should_retry(error.kind(), retries_done) {
            if error.is_retryable() {
                warn!(
                    "{}: giving up after {} attempts: {}",
                    operation_name, attempts, error
                );
            } else {
                debug!("{}: non-retryable error: {}", operation_name, error);
            }
            return Err(error.with_attempts(attempts));
        }

        let delay = policy.backoff(retries_done);
        warn!(
            "{}: attempt {}/{} failed ({}), retrying in {}ms...",
            operation_name,
            attempts,
            total,
            error,
            delay.as_millis()
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ApiError::cancelled(format!(
                    "{}: cancelled while waiting to retry after attempt {}/{}",
                    operation_name, attempts, total
                ))
                .with_attempts(attempts)
                .with_source(error));
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
