//! Retry policy shared by every external call site.
//!
//! Attempt *k* waits `base_delay * multiplier^(k-1)` before the next try,
//! capped at `max_delay`. Only transient service errors are retried.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::adapters::ServiceError;

/// Attempt budget and backoff curve for one kind of external call.
///
/// Missing YAML keys fall back to three attempts starting at one second,
/// doubling, capped at thirty seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total tries, the first one included
    pub max_attempts: u32,

    /// Wait after the first failure (ms)
    pub base_delay_ms: u64,

    /// Upper bound on any single wait (ms)
    pub max_delay_ms: u64,

    /// Growth factor between consecutive waits
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy with the given attempt count and base delay, doubling each time
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Wait after failed attempt `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = (self.base_delay_ms as f64 * self.multiplier.powi(exponent))
            .min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }

    /// Whether another try is allowed after `attempt` tries
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Run `call` until it succeeds, fails non-transiently, or attempts run out.
///
/// Attempts are strictly sequential; the task sleeps between them and does
/// nothing else in the meantime.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 1u32;

    loop {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_transient() || !policy.should_retry(attempt) {
            error!(operation, attempt, error = %err, "Giving up on call");
            return Err(err);
        }

        let wait = policy.delay_for_attempt(attempt);
        warn!(
            operation,
            attempt,
            wait_ms = wait.as_millis() as u64,
            error = %err,
            "Transient failure, will retry"
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::exponential(max_attempts, Duration::ZERO)
    }

    #[test]
    fn test_backoff_schedule_is_capped() {
        let policy = RetryPolicy {
            max_delay_ms: 10_000,
            ..RetryPolicy::default()
        };

        let waits: Vec<u64> = (1..=5)
            .map(|attempt| policy.delay_for_attempt(attempt).as_millis() as u64)
            .collect();
        assert_eq!(waits, vec![1_000, 2_000, 4_000, 8_000, 10_000]);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let policy: RetryPolicy = serde_yaml::from_str("max_attempts: 5").unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay_ms, 1_000);
        assert_eq!(policy.multiplier, 2.0);
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(10));
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result = with_retry(&instant_policy(3), "test", move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(ServiceError::Transient("503".to_string()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), _> = with_retry(&instant_policy(4), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::Transient("timeout".to_string()))
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), _> = with_retry(&instant_policy(5), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::Malformed("not json".to_string()))
        })
        .await;

        assert!(matches!(result, Err(ServiceError::Malformed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
