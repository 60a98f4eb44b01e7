//! Exponential-backoff retry engine for idempotent outbound calls
//!
//! Delay growth is deterministic (no jitter): `delay(0) = base_delay`,
//! `delay(n) = min(max_delay, base_delay * multiplier^n)`, computed
//! iteratively so large attempt indices clamp instead of overflowing.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::errors::{FeedError, FeedResult};

/// Retry policy for outbound operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    /// Multiplier for exponential growth
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Reject self-contradictory parameters. Called at construction time;
    /// the service must refuse to start with a bad policy.
    pub fn validate(&self) -> FeedResult<()> {
        if self.base_delay.is_zero() {
            return Err(FeedError::Configuration(
                "retry base_delay must be > 0".to_string(),
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(FeedError::Configuration(
                "retry max_delay must be >= base_delay".to_string(),
            ));
        }
        if self.multiplier <= 1.0 {
            return Err(FeedError::Configuration(format!(
                "retry multiplier {} must be > 1.0",
                self.multiplier
            )));
        }
        Ok(())
    }

    /// Delay before the retry following attempt `attempt` (0-indexed).
    ///
    /// Iterative multiply-and-clamp: the running value clamps to
    /// `max_delay` as soon as it exceeds it, so no intermediate value is
    /// ever constructed from an overflowing float.
    pub fn delay(&self, attempt: u32) -> Duration {
        let mut delay = self.base_delay;
        for _ in 0..attempt {
            if delay >= self.max_delay {
                return self.max_delay;
            }
            let next = delay.as_secs_f64() * self.multiplier;
            if next >= self.max_delay.as_secs_f64() {
                return self.max_delay;
            }
            delay = Duration::from_secs_f64(next);
        }
        delay.min(self.max_delay)
    }
}

/// Execute an idempotent operation with classified-error-aware retries
///
/// On failure the classified error decides whether another attempt runs: a
/// non-retryable error or the last allowed attempt returns immediately.
/// The inter-attempt sleep observes the caller's cancellation signal.
/// Exhausting every attempt wraps the last error with an
/// "all attempts failed" note.
pub async fn retry_with_backoff<F, Fut, T>(
    operation: &str,
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut op: F,
) -> FeedResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FeedResult<T>>,
{
    for attempt in 0..=policy.max_attempts {
        if attempt > 0 {
            debug!(
                operation,
                attempt = attempt + 1,
                max_attempts = policy.max_attempts + 1,
                "retrying operation"
            );
        }

        let err = match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation, attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            debug!(operation, error = %err, "non-retryable error, giving up");
            return Err(err);
        }
        if attempt == policy.max_attempts {
            warn!(operation, attempts = attempt + 1, error = %err, "all attempts exhausted");
            return Err(FeedError::AllAttemptsFailed {
                operation: operation.to_string(),
                attempts: attempt + 1,
                source: Box::new(err),
            });
        }

        let delay = policy.delay(attempt);
        warn!(
            operation,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "attempt failed, backing off"
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                return Err(FeedError::Cancelled {
                    operation: operation.to_string(),
                });
            }
        }
    }
    unreachable!("retry loop returns from its final iteration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(max_attempts: u32, base_ms: u64, max_ms: u64, multiplier: f64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier,
        }
    }

    fn retryable(op: &str) -> FeedError {
        FeedError::UpstreamStatus {
            operation: op.to_string(),
            status: 500,
        }
    }

    #[test]
    fn test_delay_growth_and_cap() {
        let p = policy(5, 100, 1000, 2.0);
        assert_eq!(p.delay(0), Duration::from_millis(100));
        assert_eq!(p.delay(1), Duration::from_millis(200));
        assert_eq!(p.delay(2), Duration::from_millis(400));
        assert_eq!(p.delay(3), Duration::from_millis(800));
        assert_eq!(p.delay(4), Duration::from_millis(1000));
        assert_eq!(p.delay(60), Duration::from_millis(1000));
    }

    #[test]
    fn test_delay_huge_attempt_does_not_overflow() {
        let p = policy(5, 1, u64::MAX / 1_000_000, 10.0);
        // Must clamp, not panic, for absurd attempt indices
        assert!(p.delay(u32::MAX) <= p.max_delay);
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        assert!(policy(3, 0, 100, 2.0).validate().is_err());
        assert!(policy(3, 200, 100, 2.0).validate().is_err());
        assert!(policy(3, 100, 200, 1.0).validate().is_err());
        assert!(policy(3, 100, 200, 0.5).validate().is_err());
        assert!(policy(0, 100, 200, 1.5).validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_delay_capped_and_non_decreasing(
            base_ms in 1u64..2_000,
            max_ms in 1u64..60_000,
            multiplier in 1.01f64..8.0,
            attempt in 0u32..64,
        ) {
            let p = policy(3, base_ms, base_ms.max(max_ms), multiplier);
            let d_n = p.delay(attempt);
            let d_next = p.delay(attempt + 1);
            prop_assert!(d_n <= p.max_delay);
            prop_assert!(d_next >= d_n);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let p = policy(3, 100, 1000, 2.0);
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff("op", &p, &CancelToken::never(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, FeedError>(42u32)
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds_with_backoff_elapsed() {
        let p = policy(3, 100, 1000, 2.0);
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry_with_backoff("op", &p, &CancelToken::never(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(retryable("op"))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two failures slept delay(0) + delay(1) = 100ms + 200ms
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let p = policy(5, 100, 1000, 2.0);
        let calls = AtomicU32::new(0);

        let err = retry_with_backoff("op", &p, &CancelToken::never(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<u32, _>(FeedError::Validation {
                    operation: "op".to_string(),
                    message: "bad".to_string(),
                })
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, FeedError::Validation { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_wraps_last_error() {
        let p = policy(2, 50, 500, 2.0);
        let calls = AtomicU32::new(0);

        let err = retry_with_backoff("op", &p, &CancelToken::never(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>(retryable("op")) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            FeedError::AllAttemptsFailed { attempts, source, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, FeedError::UpstreamStatus { status: 500, .. }));
            }
            other => panic!("expected AllAttemptsFailed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let p = policy(3, 60_000, 60_000, 2.0);
        let (handle, token) = cancel_pair();

        let fut = retry_with_backoff("op", &p, &token, || async { Err::<u32, _>(retryable("op")) });
        tokio::pin!(fut);

        // Let the first attempt fail and the backoff sleep start
        tokio::select! {
            _ = &mut fut => panic!("should still be backing off"),
            _ = tokio::time::sleep(Duration::from_millis(10)) => {}
        }
        handle.cancel();

        let err = fut.await.unwrap_err();
        assert!(matches!(err, FeedError::Cancelled { .. }));
    }
}
