//! Price acquisition client
//!
//! Composes the token bucket, the retry engine, and the error classifier
//! into a single `fetch_price` entry point: admit, fetch with retries,
//! select the best pair, validate, build the immutable quote.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, instrument};

use crate::cancel::CancelToken;
use crate::config::{PriceBoundsConfig, QuoteConfig, RateLimitConfig, RetryConfig};
use crate::errors::{FeedError, FeedResult};
use crate::price::pairs::{select_best_pair, PairsResponse};
use crate::rate_limit::TokenBucket;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::types::PriceQuote;

/// Client for the external quote source
pub struct PriceClient {
    http: reqwest::Client,
    bucket: TokenBucket,
    retry: RetryPolicy,
    quote: QuoteConfig,
    bounds: PriceBoundsConfig,
}

impl PriceClient {
    /// Construct the client. Fails fast on self-contradictory configuration.
    pub fn new(
        quote: QuoteConfig,
        bounds: PriceBoundsConfig,
        rate_limit: RateLimitConfig,
        retry: RetryConfig,
    ) -> FeedResult<Self> {
        if bounds.min <= 0.0 || bounds.min >= bounds.max {
            return Err(FeedError::Configuration(format!(
                "price bounds [{}, {}] are invalid",
                bounds.min, bounds.max
            )));
        }
        let policy = retry.to_policy();
        policy.validate()?;
        let bucket = TokenBucket::new(
            rate_limit.max_requests,
            Duration::from_millis(rate_limit.window_ms),
        )?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(quote.timeout_secs))
            .build()
            .map_err(|e| FeedError::Configuration(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            http,
            bucket,
            retry: policy,
            quote,
            bounds,
        })
    }

    /// Fetch, select, and validate a price quote
    ///
    /// Suspension points (rate-limiter wait, backoff sleep, the HTTP round
    /// trip) all observe the caller's cancellation signal.
    #[instrument(skip(self, cancel), fields(source = %self.quote.source))]
    pub async fn fetch_price(&self, cancel: &CancelToken) -> FeedResult<PriceQuote> {
        self.bucket.acquire(cancel).await?;

        let response = retry_with_backoff("fetch_quote", &self.retry, cancel, || {
            self.fetch_raw_quote()
        })
        .await?;

        let pairs = response.pairs.unwrap_or_default();
        debug!(pair_count = pairs.len(), "quote source responded");

        let selected = select_best_pair(&pairs, &self.bounds)?;

        // Defense in depth: re-check the selected price against bounds
        if selected.price < self.bounds.min || selected.price > self.bounds.max {
            return Err(FeedError::Validation {
                operation: "fetch_price".to_string(),
                message: format!(
                    "selected price {} outside bounds [{}, {}]",
                    selected.price, self.bounds.min, self.bounds.max
                ),
            });
        }

        Ok(PriceQuote {
            price: selected.price,
            pair: selected.pair.label(),
            liquidity_usd: selected.liquidity_usd,
            volume_h24: selected.volume_h24,
            source: self.quote.source.clone(),
            fetched_at: Utc::now(),
        })
    }

    // One HTTP round trip, classified on failure
    async fn fetch_raw_quote(&self) -> FeedResult<PairsResponse> {
        let response = self
            .http
            .get(&self.quote.url)
            .send()
            .await
            .map_err(|e| FeedError::from_reqwest("fetch_quote", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::UpstreamStatus {
                operation: "fetch_quote".to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<PairsResponse>()
            .await
            .map_err(|e| FeedError::from_reqwest("fetch_quote", e))
    }
}
