//! Configuration module for the tradefeed service
//!
//! This module handles all configuration loading from TOML files,
//! environment variables, and provides structured configuration types.
//! Validation is fatal at construction time: the service refuses to start
//! with self-contradictory parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{FeedError, FeedResult};
use crate::retry::RetryPolicy;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Quote-source configuration
    #[serde(default)]
    pub quote: QuoteConfig,

    /// Valid price bounds for quote validation
    #[serde(default)]
    pub price_bounds: PriceBoundsConfig,

    /// Price cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Outbound rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry/backoff configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Solana RPC configuration
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Trade discovery configuration
    #[serde(default)]
    pub trades: TradesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteConfig {
    /// Quote-source URL returning the trading-pair document
    #[serde(default = "default_quote_url")]
    pub url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_quote_timeout")]
    pub timeout_secs: u64,

    /// Source tag stamped on produced quotes
    #[serde(default = "default_quote_source")]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBoundsConfig {
    /// Minimum valid price (inclusive)
    #[serde(default = "default_min_price")]
    pub min: f64,

    /// Maximum valid price (inclusive)
    #[serde(default = "default_max_price")]
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry TTL in seconds; 0 disables caching entirely
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Business-level max staleness window in seconds
    #[serde(default = "default_max_staleness")]
    pub max_staleness_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Admitted requests per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window duration in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Number of retries after the initial attempt
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Solana RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradesConfig {
    /// Mint address of the tracked asset
    #[serde(default = "default_mint")]
    pub mint: String,

    /// Hard cap on a single page
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Page size used when the caller passes zero
    #[serde(default = "default_page_limit")]
    pub default_limit: usize,
}

// Default value functions
fn default_quote_url() -> String {
    "https://api.dexscreener.com/latest/dex/tokens/So11111111111111111111111111111111111111112"
        .to_string()
}
fn default_quote_timeout() -> u64 {
    10
}
fn default_quote_source() -> String {
    "dexscreener".to_string()
}
fn default_min_price() -> f64 {
    0.000_001
}
fn default_max_price() -> f64 {
    1_000_000.0
}
// Caching disabled by default: always serve the freshest value
fn default_cache_ttl() -> u64 {
    0
}
fn default_max_staleness() -> u64 {
    300
}
fn default_max_requests() -> u32 {
    10
}
fn default_window_ms() -> u64 {
    1_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    250
}
fn default_max_delay_ms() -> u64 {
    5_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}
fn default_rpc_timeout() -> u64 {
    30
}
fn default_mint() -> String {
    // Wrapped SOL
    "So11111111111111111111111111111111111111112".to_string()
}
fn default_max_limit() -> usize {
    50
}
fn default_page_limit() -> usize {
    10
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            url: default_quote_url(),
            timeout_secs: default_quote_timeout(),
            source: default_quote_source(),
        }
    }
}

impl Default for PriceBoundsConfig {
    fn default() -> Self {
        Self {
            min: default_min_price(),
            max: default_max_price(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            max_staleness_secs: default_max_staleness(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Default for TradesConfig {
    fn default() -> Self {
        Self {
            mint: default_mint(),
            max_limit: default_max_limit(),
            default_limit: default_page_limit(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            quote: QuoteConfig::default(),
            price_bounds: PriceBoundsConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            rpc: RpcConfig::default(),
            trades: TradesConfig::default(),
        }
    }
}

impl RetryConfig {
    /// Build the runtime retry policy from this section
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

impl FeedConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> FeedResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FeedError::Configuration(format!("failed to read config file {}: {}", path, e))
        })?;
        let config: FeedConfig = toml::from_str(&content)
            .map_err(|e| FeedError::Configuration(format!("failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> FeedResult<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        if let Ok(url) = std::env::var("TRADEFEED_QUOTE_URL") {
            config.quote.url = url;
        }
        if let Ok(url) = std::env::var("TRADEFEED_RPC_URL") {
            config.rpc.url = url;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject self-contradictory parameters
    pub fn validate(&self) -> FeedResult<()> {
        if self.quote.url.is_empty() {
            return Err(FeedError::Configuration("quote url must not be empty".to_string()));
        }
        if self.quote.timeout_secs == 0 {
            return Err(FeedError::Configuration(
                "quote timeout_secs must be > 0".to_string(),
            ));
        }
        if self.price_bounds.min <= 0.0 {
            return Err(FeedError::Configuration(format!(
                "price_bounds.min {} must be > 0",
                self.price_bounds.min
            )));
        }
        if self.price_bounds.min >= self.price_bounds.max {
            return Err(FeedError::Configuration(format!(
                "price_bounds.min {} must be < price_bounds.max {}",
                self.price_bounds.min, self.price_bounds.max
            )));
        }
        if self.cache.max_staleness_secs == 0 {
            return Err(FeedError::Configuration(
                "cache max_staleness_secs must be > 0".to_string(),
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(FeedError::Configuration(
                "rate_limit.max_requests must be > 0".to_string(),
            ));
        }
        if self.rate_limit.window_ms == 0 {
            return Err(FeedError::Configuration(
                "rate_limit.window_ms must be > 0".to_string(),
            ));
        }
        self.retry.to_policy().validate()?;
        if self.rpc.timeout_secs == 0 {
            return Err(FeedError::Configuration("rpc timeout_secs must be > 0".to_string()));
        }
        if self.trades.max_limit == 0 || self.trades.max_limit > 1_000 {
            return Err(FeedError::Configuration(format!(
                "trades.max_limit {} out of valid range (1-1000)",
                self.trades.max_limit
            )));
        }
        if self.trades.default_limit == 0 || self.trades.default_limit > self.trades.max_limit {
            return Err(FeedError::Configuration(format!(
                "trades.default_limit {} must be in 1..=max_limit",
                self.trades.default_limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = FeedConfig::default();
        assert!(config.validate().is_ok());
        // Caching is disabled out of the box
        assert_eq!(config.cache.ttl_secs, 0);
    }

    #[test]
    fn test_from_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[quote]
url = "https://example.com/pairs"
timeout_secs = 5

[price_bounds]
min = 100.0
max = 200.0

[cache]
ttl_secs = 30

[rate_limit]
max_requests = 3
window_ms = 500
"#
        )
        .unwrap();

        let config = FeedConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.quote.url, "https://example.com/pairs");
        assert_eq!(config.price_bounds.min, 100.0);
        assert_eq!(config.cache.ttl_secs, 30);
        assert_eq!(config.rate_limit.max_requests, 3);
        // Unspecified sections fall back to defaults
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.trades.max_limit, 50);
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut config = FeedConfig::default();
        config.price_bounds.min = 200.0;
        config.price_bounds.max = 100.0;
        assert!(matches!(
            config.validate(),
            Err(FeedError::Configuration(_))
        ));
    }

    #[test]
    fn test_non_positive_min_rejected() {
        let mut config = FeedConfig::default();
        config.price_bounds.min = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_multiplier_rejected() {
        let mut config = FeedConfig::default();
        config.retry.multiplier = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_ttl_is_allowed() {
        let mut config = FeedConfig::default();
        config.cache.ttl_secs = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_limit_above_max_rejected() {
        let mut config = FeedConfig::default();
        config.trades.default_limit = 60;
        config.trades.max_limit = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = FeedConfig::from_file("/nonexistent/tradefeed.toml").unwrap_err();
        assert!(matches!(err, FeedError::Configuration(_)));
    }
}
