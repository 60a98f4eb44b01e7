//! Quote-source wire format and best-pair selection
//!
//! The quote source returns a document listing every trading pair for the
//! tracked asset. Prices arrive as string-encoded decimals and any field
//! may be missing, so the wire structs are fully optional and selection
//! filters instead of failing.

use serde::Deserialize;

use crate::config::PriceBoundsConfig;
use crate::errors::{FeedError, FeedResult};

/// Top-level quote-source document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairsResponse {
    #[serde(default)]
    pub schema_version: Option<String>,

    /// All quoted trading pairs; null when the asset is unknown upstream
    #[serde(default)]
    pub pairs: Option<Vec<PairQuote>>,
}

/// One quoted trading pair
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairQuote {
    #[serde(default)]
    pub chain_id: Option<String>,

    #[serde(default)]
    pub dex_id: Option<String>,

    #[serde(default)]
    pub base_token: Option<TokenInfo>,

    #[serde(default)]
    pub quote_token: Option<TokenInfo>,

    /// String-encoded decimal price in USD
    #[serde(default)]
    pub price_usd: Option<String>,

    #[serde(default)]
    pub volume: Option<VolumeInfo>,

    #[serde(default)]
    pub liquidity: Option<LiquidityInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VolumeInfo {
    /// 24-hour volume in USD
    #[serde(default)]
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiquidityInfo {
    /// Pooled liquidity in USD
    #[serde(default)]
    pub usd: Option<f64>,
}

impl PairQuote {
    /// Pair label, "BASE/QUOTE"
    pub fn label(&self) -> String {
        let base = self
            .base_token
            .as_ref()
            .and_then(|t| t.symbol.as_deref())
            .unwrap_or("UNKNOWN");
        let quote = self
            .quote_token
            .as_ref()
            .and_then(|t| t.symbol.as_deref())
            .unwrap_or("UNKNOWN");
        format!("{}/{}", base, quote)
    }
}

/// A pair that survived filtering, with its parsed numbers
#[derive(Debug, Clone)]
pub struct SelectedPair<'a> {
    pub pair: &'a PairQuote,
    pub price: f64,
    pub liquidity_usd: f64,
    pub volume_h24: f64,
}

/// Pick the best pair among all quoted ones
///
/// Pairs with a missing, non-numeric, non-positive, or out-of-bounds price
/// are discarded. Survivors are scored `liquidity + 0.1 * volume_h24`; the
/// maximum wins and ties keep the first-seen candidate. An empty survivor
/// set is a data problem, not a transient one.
pub fn select_best_pair<'a>(
    pairs: &'a [PairQuote],
    bounds: &PriceBoundsConfig,
) -> FeedResult<SelectedPair<'a>> {
    let mut best: Option<(SelectedPair<'a>, f64)> = None;

    for pair in pairs {
        let Some(price_str) = pair.price_usd.as_deref() else {
            continue;
        };
        let Ok(price) = price_str.trim().parse::<f64>() else {
            continue;
        };
        if !price.is_finite() || price <= 0.0 {
            continue;
        }
        if price < bounds.min || price > bounds.max {
            continue;
        }

        let liquidity_usd = pair
            .liquidity
            .as_ref()
            .and_then(|l| l.usd)
            .unwrap_or(0.0)
            .max(0.0);
        let volume_h24 = pair.volume.as_ref().and_then(|v| v.h24).unwrap_or(0.0).max(0.0);
        let score = liquidity_usd + 0.1 * volume_h24;

        // Strict comparison keeps the first-seen maximum on ties
        let replace = match &best {
            Some((_, best_score)) => score > *best_score,
            None => true,
        };
        if replace {
            best = Some((
                SelectedPair {
                    pair,
                    price,
                    liquidity_usd,
                    volume_h24,
                },
                score,
            ));
        }
    }

    best.map(|(selected, _)| selected).ok_or(FeedError::NoValidPairs)
}
