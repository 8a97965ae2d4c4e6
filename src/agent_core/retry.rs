//! Bounded exponential backoff for overloaded providers.

use std::future::Future;
use std::time::Duration;

use crate::inference::InferenceError;

use super::errors::AgentError;

/// Delay schedule for retrying an overloaded provider.
///
/// Retry `n` (0-based) waits `initial * 2^n`, capped at `max`. Only
/// overload errors are retried; the call is attempted at most
/// `1 + max_retries` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            max_retries: 5,
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Run `call` until it succeeds, fails with a non-overload error, or the
/// retries run out.
pub async fn call_with_backoff<T, F, Fut>(policy: &BackoffPolicy, mut call: F) -> Result<T, AgentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InferenceError>>,
{
    let mut retry = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_overloaded() && retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                retry += 1;
                tracing::warn!(
                    attempt = retry,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "provider overloaded, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) if e.is_overloaded() => {
                return Err(AgentError::ProviderOverloaded {
                    retries: policy.max_retries,
                    source: e,
                });
            }
            Err(e) => return Err(AgentError::Provider(e)),
        }
    }
}
