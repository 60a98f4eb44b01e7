//! Token-bucket admission control for outbound quote requests
//!
//! Bounds the outbound request rate to `max_tokens` per `refill_interval`
//! without a background ticking task: the bucket refills lazily from elapsed
//! time whenever it is checked.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::errors::{FeedError, FeedResult};

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

/// Token bucket rate limiter
///
/// Interior state is guarded by a mutex; callers only see atomic
/// check-and-consume operations, never the raw counter.
#[derive(Debug)]
pub struct TokenBucket {
    max_tokens: u32,
    refill_interval: Duration,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket. `max_tokens` admissions are allowed per
    /// `refill_interval` window.
    pub fn new(max_tokens: u32, refill_interval: Duration) -> FeedResult<Self> {
        if max_tokens == 0 {
            return Err(FeedError::Configuration(
                "rate limiter max_tokens must be > 0".to_string(),
            ));
        }
        if refill_interval.is_zero() {
            return Err(FeedError::Configuration(
                "rate limiter refill_interval must be > 0".to_string(),
            ));
        }
        Ok(Self {
            max_tokens,
            refill_interval,
            state: Mutex::new(BucketState {
                tokens: max_tokens,
                last_refill: Instant::now(),
            }),
        })
    }

    // Refill from elapsed whole windows, capped at max_tokens. Advances
    // last_refill by whole windows so the tick cadence stays stable.
    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        if elapsed >= self.refill_interval {
            let windows = (elapsed.as_nanos() / self.refill_interval.as_nanos()) as u32;
            state.tokens = self.max_tokens;
            state.last_refill += self.refill_interval * windows;
        }
    }

    /// Try to consume one token. Returns false when the bucket is empty.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        if state.tokens > 0 {
            state.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Remaining time until the next refill tick. Zero when a token is
    /// already available.
    pub async fn time_until_next_token(&self) -> Duration {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        if state.tokens > 0 {
            return Duration::ZERO;
        }
        let elapsed = Instant::now().duration_since(state.last_refill);
        self.refill_interval.saturating_sub(elapsed)
    }

    /// Acquire one token, suspending until the next refill tick when the
    /// bucket is empty. A fired cancellation signal aborts the wait with a
    /// non-retryable classified error.
    pub async fn acquire(&self, cancel: &CancelToken) -> FeedResult<()> {
        loop {
            if self.try_acquire().await {
                return Ok(());
            }
            let wait = self.time_until_next_token().await;
            if wait.is_zero() {
                // A refill landed between the two checks; try again
                continue;
            }
            debug!(wait_ms = wait.as_millis() as u64, "rate limiter exhausted, waiting");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => {
                    return Err(FeedError::Cancelled {
                        operation: "rate_limit_wait".to_string(),
                    });
                }
            }
        }
    }

    /// Snapshot of currently available tokens, for logging and tests.
    pub async fn available(&self) -> u32 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }
}
