use crate::error::BackendError;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Deadline and retry budget for a single backend operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(30),
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: base * 2^attempt, capped at `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2_u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }
}

/// Run `call` under the policy deadline. Timeouts are retried with backoff;
/// any other failure is permanent and returned immediately.
pub async fn call_with_retry<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    mut call: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        match tokio::time::timeout(policy.timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if !e.is_timeout() => return Err(e),
            Ok(Err(e)) => warn!("Backend {} attempt {}/{} timed out: {}", operation, attempt, attempts, e),
            Err(_) => warn!(
                "Backend {} attempt {}/{} exceeded {:?}",
                operation, attempt, attempts, policy.timeout
            ),
        }

        if attempt < attempts {
            tokio::time::sleep(policy.delay_for_attempt(attempt - 1)).await;
        }
    }

    error!("Backend {} timed out after {} attempts", operation, attempts);
    Err(BackendError::Timeout {
        operation: operation.to_string(),
        attempts,
    })
}
