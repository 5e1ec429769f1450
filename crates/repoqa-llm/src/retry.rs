use std::future::Future;
use std::time::Duration;

use crate::error::LlmError;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Bounded exponential backoff applied to every external model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Per-attempt deadline. Expiry counts as a transient failure.
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            timeout: None,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Backoff before attempt `attempt + 1`: `base * 2^attempt`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `f` under `policy`, retrying transient failures with exponential backoff.
///
/// A `Retry-After` hint from the provider takes precedence over the computed
/// delay but is still capped at `max_delay`.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first fatal error.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op: &str, mut f: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        let result = match policy.timeout {
            Some(limit) => tokio::time::timeout(limit, f())
                .await
                .unwrap_or(Err(LlmError::Timeout(limit))),
            None => f().await,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                let delay = e
                    .retry_after()
                    .unwrap_or_else(|| policy.delay_for(attempt))
                    .min(policy.max_delay);
                tracing::warn!(
                    op,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "{e}, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!(op, attempts = attempt + 1, "giving up: {e}");
                }
                return Err(e);
            }
        }
    }
}
