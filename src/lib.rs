//! tradefeed - read-only acquisition pipelines over external market data
//!
//! Two independent, stateless-per-call pipelines: price acquisition
//! (rate-limited, retried, validated quotes with an optional TTL cache)
//! and trade discovery (cursor-paginated decoded trade history for a
//! wallet). Both report failures as classified errors the boundary layer
//! can render directly.

pub mod cancel;
pub mod config;
pub mod errors;
pub mod price;
pub mod rate_limit;
pub mod retry;
pub mod trades;
pub mod types;

pub use crate::config::FeedConfig;
pub use crate::errors::{ErrorSource, FeedError, FeedResult};
pub use crate::types::{PriceQuote, Trade, TradePage};
