//! Common types used throughout the application

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A validated price quote for the tracked pair
///
/// Immutable once constructed; consumers clone it out of the cache rather
/// than holding references into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Price in the quote currency
    pub price: f64,

    /// Pair label, "BASE/QUOTE"
    pub pair: String,

    /// USD liquidity snapshot of the selected pair
    pub liquidity_usd: f64,

    /// 24-hour volume snapshot of the selected pair
    pub volume_h24: f64,

    /// Source of the quote (e.g. "dexscreener")
    pub source: String,

    /// When this quote was fetched
    pub fetched_at: DateTime<Utc>,
}

/// One signature entry from the RPC history query
///
/// Ephemeral: produced once per pipeline run and consumed in place.
#[derive(Debug, Clone)]
pub struct SignatureRecord {
    /// Transaction signature, base58
    pub signature: String,

    /// Ledger slot the transaction landed in
    pub slot: u64,

    /// Block time, if the RPC node reported one
    pub block_time: Option<i64>,

    /// Whether the transaction failed on chain
    pub failed: bool,
}

/// Trade direction from the wallet's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// A decoded trade involving the tracked asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Transaction signature, base58
    pub signature: String,

    /// Ledger slot, the recency sort key
    pub slot: u64,

    /// Block time, if known
    pub block_time: Option<i64>,

    /// Buy or sell, relative to the wallet
    pub side: Side,

    /// Amount of the tracked asset moved, in UI units
    pub base_amount: f64,

    /// Owning wallet address
    pub wallet: String,
}

/// Cursor pagination metadata for a trade page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    /// Best-effort signal that another page likely exists
    pub has_more: bool,

    /// Signature to pass as `before` on the next call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,

    /// The limit this page was built with
    pub limit: usize,

    /// Number of trades actually returned
    pub count: usize,
}

/// One page of decoded trades, newest slot first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePage {
    /// Decoded trades, sorted by slot descending
    pub trades: Vec<Trade>,

    /// Wallet the page was built for
    pub wallet: String,

    /// When the request was served
    pub requested_at: DateTime<Utc>,

    /// Same as `pagination.count`
    pub count: usize,

    pub pagination: Pagination,
}
