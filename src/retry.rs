//! Bounded retry with error classification.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, ErrorKind, Result};

/// Retry policy for a call.
///
/// `max == 0` means a single attempt whose error is returned as is.
/// Errors whose kind is in `ignored` are free: they do not count against
/// `max` and the next attempt starts without delay. Errors in `terminal`
/// stop immediately.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max: usize,
    pub delay: Duration,
    pub ignored: Vec<ErrorKind>,
    pub terminal: Vec<ErrorKind>,
}

impl RetryPolicy {
    /// Up to `max` counted attempts, no delay.
    pub fn new(max: usize) -> Self {
        Self {
            max,
            ..Self::default()
        }
    }

    /// Sleep between counted attempts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Retry `kind` without consuming an attempt.
    pub fn ignore(mut self, kind: ErrorKind) -> Self {
        self.ignored.push(kind);
        self
    }

    /// Stop retrying on `kind`.
    pub fn stop_on(mut self, kind: ErrorKind) -> Self {
        self.terminal.push(kind);
        self
    }

    /// Run `attempt` under this policy.
    pub async fn run<T, F, Fut>(&self, attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_inner(None, attempt).await
    }

    /// Run `attempt` under this policy, giving up at `deadline`.
    ///
    /// The first failure observed at or after `deadline` is returned as is,
    /// without classification, and delays are cut short at `deadline`.
    pub async fn run_until<T, F, Fut>(&self, deadline: Instant, attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_inner(Some(deadline), attempt).await
    }

    async fn run_inner<T, F, Fut>(&self, deadline: Option<Instant>, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.max == 0 {
            return attempt().await;
        }

        let mut counted = 0;
        let mut free_retry = false;
        let mut last_error = None;

        while counted < self.max {
            if counted > 0 && !free_retry && !self.delay.is_zero() {
                let wake = Instant::now() + self.delay;
                tokio::time::sleep_until(deadline.map_or(wake, |deadline| wake.min(deadline))).await;
            }
            free_retry = false;

            let err = match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                tracing::debug!("Deadline reached after {} counted attempts: {}", counted, err);
                return Err(err);
            }
            let kind = err.kind();

            if self.terminal.contains(&kind) {
                tracing::debug!("Terminal error on attempt {}: {}", counted + 1, err);
                return Err(err);
            }

            if self.ignored.contains(&kind) {
                tracing::debug!("Ignored error, retrying without counting: {}", err);
                free_retry = true;
            } else {
                counted += 1;
                tracing::debug!("Attempt {}/{} failed: {}", counted, self.max, err);
            }
            last_error = Some(err);
        }

        if let Some(err) = last_error {
            tracing::debug!("Retries exhausted, last error: {}", err);
        }
        Err(Error::RetryExhausted {
            attempts: self.max,
        })
    }
}
