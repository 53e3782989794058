//! Retry policy and the shared retry wrapper
//!
//! One wrapper serves both gas estimation and confirmation waiting. The
//! default policy is exponential backoff with uniform jitter; jitter is
//! drawn fresh per attempt so concurrent relay instances hitting the same
//! endpoint do not retry in lockstep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{RelayError, RelayResult};
use crate::metrics;

/// Decides whether and when a failed operation is retried
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, error: &RelayError, attempt: u32) -> bool;
    fn delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff with jitter in [0.75, 1.25]
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30000),
        }
    }
}

impl From<&RetryConfig> for ExponentialBackoff {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn should_retry(&self, error: &RelayError, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        // Terminal classifications cannot be fixed by waiting.
        !error.is_terminal()
    }

    fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.min(20);
        let exp_ms = (self.base_delay.as_millis() as u64).saturating_mul(1u64 << shift);
        let capped = Duration::from_millis(exp_ms.min(self.max_delay.as_millis() as u64));

        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        capped.mul_f64(jitter)
    }
}

/// Run an operation under a retry policy
///
/// Explicit loop with an attempt counter; each failure is consulted
/// against the policy and the delay is computed fresh per attempt.
pub async fn with_retry<T, F, Fut>(
    policy: &dyn RetryPolicy,
    op_name: &str,
    mut op: F,
) -> RelayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RelayResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if !policy.should_retry(&err, attempt) {
                    return Err(err);
                }
                let delay = policy.delay(attempt);
                warn!(
                    "{} failed (attempt {}): {}; retrying in {:?}",
                    op_name, attempt, err, delay
                );
                metrics::record_retry(op_name);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> RelayError {
        RelayError::new(ErrorKind::TemporaryFailure, "connection reset")
    }

    fn fast_policy(max_attempts: u32) -> ExponentialBackoff {
        ExponentialBackoff {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn never_retries_past_attempt_ceiling() {
        let policy = ExponentialBackoff::default();
        assert!(policy.should_retry(&transient(), 4));
        assert!(!policy.should_retry(&transient(), 5));
        assert!(!policy.should_retry(&transient(), 6));
    }

    #[test]
    fn never_retries_terminal_kinds() {
        let policy = ExponentialBackoff::default();
        for kind in [
            ErrorKind::InsufficientFunds,
            ErrorKind::InvalidSignature,
            ErrorKind::PermanentRevert,
        ] {
            let err = RelayError::new(kind, "terminal");
            assert!(!policy.should_retry(&err, 0));
            assert!(!policy.should_retry(&err, 1));
        }
    }

    #[test]
    fn retries_timeout_and_estimation_failures() {
        let policy = ExponentialBackoff::default();
        assert!(policy.should_retry(&RelayError::timeout("receipt"), 1));
        assert!(policy.should_retry(&RelayError::gas_estimation("node error"), 1));
    }

    #[test]
    fn delay_stays_within_jitter_bounds() {
        let policy = ExponentialBackoff::default();
        for attempt in 0..6 {
            let expected_ms = (1000u64 << attempt).min(30000) as f64;
            let delay = policy.delay(attempt).as_millis() as f64;
            assert!(delay >= expected_ms * 0.75 - 1.0, "attempt {attempt}: {delay}");
            assert!(delay <= expected_ms * 1.25 + 1.0, "attempt {attempt}: {delay}");
        }
    }

    #[test]
    fn delay_at_fourth_attempt_is_bounded() {
        let policy = ExponentialBackoff::default();
        // base 1000ms * 2^4 = 16s, jittered up to 20s; under the 30s cap.
        assert!(policy.delay(4) <= Duration::from_millis(30000));
    }

    #[test]
    fn jitter_differs_across_calls() {
        let policy = ExponentialBackoff::default();
        let samples: Vec<Duration> = (0..8).map(|_| policy.delay(3)).collect();
        assert!(samples.iter().any(|d| *d != samples[0]));
    }

    #[tokio::test]
    async fn with_retry_recovers_from_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = with_retry(&fast_policy(5), "test_op", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(42u64)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_gives_up_after_max_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: RelayResult<u64> = with_retry(&fast_policy(3), "test_op", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::TemporaryFailure);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_stops_immediately_on_terminal_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: RelayResult<u64> = with_retry(&fast_policy(5), "test_op", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RelayError::new(ErrorKind::InsufficientFunds, "broke"))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientFunds);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
