//! Retry policy: per-call timeout plus bounded exponential backoff.

use crate::error::PortError;
use shipfront_core::{DeploySettings, MAX_ATTEMPTS_LIMIT};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Longest wait between two attempts
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Retry policy for network calls.
///
/// Only [`PortError::is_transient`] failures are retried; a call that exceeds
/// `request_timeout` counts as transient.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the second attempt
    pub base_delay: Duration,

    /// Backoff multiplier
    pub multiplier: f64,

    /// Cap on any single backoff delay
    pub max_delay: Duration,

    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Upper bound for a single call
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DeploySettings::default())
    }
}

impl From<&DeploySettings> for RetryPolicy {
    fn from(settings: &DeploySettings) -> Self {
        Self {
            base_delay: settings.base_delay,
            multiplier: 2.0,
            max_delay: MAX_RETRY_DELAY,
            max_attempts: settings.max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT),
            request_timeout: settings.request_timeout,
        }
    }
}

impl RetryPolicy {
    /// Delay after `attempts` failed attempts: base_delay * multiplier^(attempts - 1),
    /// never more than `max_delay`
    ///
    /// With base_delay=500ms, multiplier=2.0: 500ms, 1s, 2s, 4s...
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }

    /// Run `call` once under the request timeout
    pub async fn once<T, Fut>(&self, operation: &str, call: Fut) -> Result<T, PortError>
    where
        Fut: Future<Output = Result<T, PortError>>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PortError::transient(format!(
                "{} timed out after {:?}",
                operation, self.request_timeout
            ))),
        }
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, PortError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PortError>>,
    {
        let mut attempts = 1;
        loop {
            match self.once(operation, call()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempts < self.max_attempts => {
                    let delay = self.next_delay(attempts);
                    warn!(
                        operation,
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempts += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
