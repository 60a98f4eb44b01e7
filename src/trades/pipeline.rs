//! Trade discovery pipeline
//!
//! Walks the derived token account's signature history newest-first,
//! filters failed transactions, delegates decoding, and assembles a
//! cursor-paginated page. The per-signature loop is partial-failure
//! tolerant: one bad transaction never aborts the whole page.

use std::str::FromStr;

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::TradesConfig;
use crate::errors::{FeedError, FeedResult};
use crate::trades::decoder::TradeDecoder;
use crate::trades::history::{AccountDeriver, SignatureHistory};
use crate::types::{Pagination, Trade, TradePage};

/// Read-only trade history service for the tracked asset
pub struct TradeService<H, D> {
    history: H,
    decoder: D,
    deriver: Box<dyn AccountDeriver>,
    max_limit: usize,
    default_limit: usize,
}

impl<H, D> TradeService<H, D>
where
    H: SignatureHistory,
    D: TradeDecoder,
{
    pub fn new(
        history: H,
        decoder: D,
        deriver: Box<dyn AccountDeriver>,
        config: &TradesConfig,
    ) -> FeedResult<Self> {
        if config.max_limit == 0 {
            return Err(FeedError::Configuration(
                "trades.max_limit must be > 0".to_string(),
            ));
        }
        if config.default_limit == 0 || config.default_limit > config.max_limit {
            return Err(FeedError::Configuration(
                "trades.default_limit must be in 1..=max_limit".to_string(),
            ));
        }
        Ok(Self {
            history,
            decoder,
            deriver,
            max_limit: config.max_limit,
            default_limit: config.default_limit,
        })
    }

    /// Build one page of decoded trades for `wallet`, newest slot first.
    #[instrument(skip(self, before), fields(request_id = %Uuid::new_v4()))]
    pub async fn get_trades(
        &self,
        wallet: &str,
        limit: usize,
        before: Option<&str>,
    ) -> FeedResult<TradePage> {
        let wallet_key = Pubkey::from_str(wallet).map_err(|e| FeedError::Validation {
            operation: "get_trades".to_string(),
            message: format!("invalid wallet address {}: {}", wallet, e),
        })?;
        let limit = self.clamp_limit(limit);
        let before_sig = before
            .map(Signature::from_str)
            .transpose()
            .map_err(|e| FeedError::Validation {
                operation: "get_trades".to_string(),
                message: format!("invalid cursor: {}", e),
            })?;

        let target = self
            .deriver
            .derive(&wallet_key)
            .map_err(|e| FeedError::Derivation {
                message: e.to_string(),
            })?;

        // Over-fetch 2x: a fraction of signatures will be filtered out
        // (failed or non-matching transactions), and the extra headroom
        // usually fills the page without a second round trip
        let mut records = self
            .history
            .signatures_for_address(&target, before_sig, limit * 2)
            .await?;
        let fetched = records.len();

        // Upstream order is not trusted
        records.sort_by(|a, b| b.slot.cmp(&a.slot));

        let mut trades: Vec<Trade> = Vec::with_capacity(limit);
        for record in &records {
            if trades.len() == limit {
                break;
            }
            if record.failed {
                debug!(signature = %record.signature, "skipping failed transaction");
                continue;
            }

            let detail = match self.history.transaction_detail(&record.signature).await {
                Ok(detail) => detail,
                Err(err) => {
                    warn!(
                        signature = %record.signature,
                        error = %err,
                        "failed to fetch transaction, continuing"
                    );
                    continue;
                }
            };

            match self.decoder.decode(&detail, &target) {
                Ok(Some(trade)) => trades.push(trade),
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        signature = %record.signature,
                        error = %err,
                        "failed to decode transaction, continuing"
                    );
                }
            }
        }

        // Best-effort signal: a full page built from a non-empty history
        // window probably has a successor. Not a guarantee either way.
        let has_more = trades.len() == limit && fetched > 0;
        let next_cursor = if has_more {
            trades.last().map(|trade| trade.signature.clone())
        } else {
            None
        };

        debug!(
            wallet,
            fetched,
            collected = trades.len(),
            has_more,
            "trade page assembled"
        );

        let count = trades.len();
        Ok(TradePage {
            trades,
            wallet: wallet.to_string(),
            requested_at: Utc::now(),
            count,
            pagination: Pagination {
                has_more,
                next_cursor,
                limit,
                count,
            },
        })
    }

    // Zero falls back to the default page size; everything else clamps
    // into [1, max_limit]
    fn clamp_limit(&self, limit: usize) -> usize {
        if limit == 0 {
            self.default_limit
        } else {
            limit.min(self.max_limit)
        }
    }
}
