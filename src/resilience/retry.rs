use super::backoff::Backoff;
use crate::config::RetryConfig;
use crate::error::{Error, ErrorKind};
use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry { delay: Duration },
    Fail,
}

/// Retry policy for dispatcher calls.
///
/// Retried: network failures, HTTP 5xx, 408 and 429 (and local timeouts when
/// `retry_timeouts` is set). Never retried: cancellation, other 4xx,
/// validation and local errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    backoff: Backoff,
    retry_timeouts: bool,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            backoff: Backoff::new(config.base_delay, config.max_delay),
            retry_timeouts: config.retry_timeouts,
        }
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn is_retryable(&self, err: &Error) -> bool {
        match err.kind() {
            ErrorKind::Network | ErrorKind::Server => true,
            ErrorKind::Client => matches!(err.status(), Some(408) | Some(429)),
            ErrorKind::Timeout => self.retry_timeouts,
            ErrorKind::Cancelled
            | ErrorKind::Validation
            | ErrorKind::Configuration
            | ErrorKind::Storage => false,
        }
    }

    /// `attempt` is the number of attempts already made (1 after the first failure).
    pub fn should_retry(&self, err: &Error, attempt: u32, max_retries: u32) -> bool {
        self.is_retryable(err) && attempt <= max_retries
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Combine [`should_retry`](Self::should_retry) and [`delay_for`](Self::delay_for).
    /// A server-supplied `Retry-After` raises the delay, still capped by the max delay.
    pub fn decide(&self, err: &Error, attempt: u32, max_retries: u32) -> Decision {
        if !self.should_retry(err, attempt, max_retries) {
            return Decision::Fail;
        }
        let mut delay = self.delay_for(attempt);
        if let Some(after) = err.retry_after() {
            delay = delay.max(after.min(self.backoff.max));
        }
        Decision::Retry { delay }
    }
}
