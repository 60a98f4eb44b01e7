//! Transaction-to-trade decoding
//!
//! The pipeline consumes the decoder as an opaque collaborator: given a
//! transaction detail and the target token account, it either yields a
//! trade, reports that none is present, or fails. The default
//! implementation reads the tracked mint's pre/post token balances for the
//! target account and interprets the delta as a fill.

use solana_sdk::pubkey::Pubkey;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{
    EncodedTransaction, UiMessage, UiTransactionTokenBalance,
};

use crate::errors::{FeedError, FeedResult};
use crate::trades::history::TransactionDetail;
use crate::types::{Side, Trade};

/// Opaque transaction decoder consumed by the pipeline
pub trait TradeDecoder: Send + Sync {
    /// `Ok(Some)` for a trade, `Ok(None)` when the transaction holds no
    /// trade for `target`, `Err` when the detail cannot be interpreted.
    fn decode(&self, detail: &TransactionDetail, target: &Pubkey) -> FeedResult<Option<Trade>>;
}

/// Decoder interpreting the tracked mint's balance delta on the target
/// token account
pub struct BalanceDeltaDecoder {
    mint: String,
}

impl BalanceDeltaDecoder {
    pub fn new(mint: &str) -> Self {
        Self {
            mint: mint.to_string(),
        }
    }

    fn balance_for<'a>(
        &self,
        balances: &'a OptionSerializer<Vec<UiTransactionTokenBalance>>,
        account_index: usize,
    ) -> Option<&'a UiTransactionTokenBalance> {
        let balances = match balances {
            OptionSerializer::Some(balances) => balances.as_slice(),
            _ => &[],
        };
        balances
            .iter()
            .find(|b| b.account_index as usize == account_index && b.mint == self.mint)
    }
}

fn decode_err(message: impl Into<String>) -> FeedError {
    FeedError::Parse {
        operation: "decode_trade".to_string(),
        message: message.into(),
    }
}

// Account keys as strings, for both raw and parsed message encodings
fn account_keys(transaction: &EncodedTransaction) -> FeedResult<Vec<String>> {
    let EncodedTransaction::Json(ui) = transaction else {
        return Err(decode_err("unsupported transaction encoding"));
    };
    match &ui.message {
        UiMessage::Raw(raw) => Ok(raw.account_keys.clone()),
        UiMessage::Parsed(parsed) => Ok(parsed
            .account_keys
            .iter()
            .map(|key| key.pubkey.clone())
            .collect()),
    }
}

fn first_signature(transaction: &EncodedTransaction) -> FeedResult<String> {
    let EncodedTransaction::Json(ui) = transaction else {
        return Err(decode_err("unsupported transaction encoding"));
    };
    ui.signatures
        .first()
        .cloned()
        .ok_or_else(|| decode_err("transaction carries no signatures"))
}

fn raw_amount(balance: &UiTransactionTokenBalance) -> FeedResult<i128> {
    balance
        .ui_token_amount
        .amount
        .parse::<i128>()
        .map_err(|e| decode_err(format!("bad token amount: {}", e)))
}

impl TradeDecoder for BalanceDeltaDecoder {
    fn decode(&self, detail: &TransactionDetail, target: &Pubkey) -> FeedResult<Option<Trade>> {
        let meta = detail
            .transaction
            .meta
            .as_ref()
            .ok_or_else(|| decode_err("transaction detail carries no meta"))?;

        // Failed transactions never produce trades
        if meta.err.is_some() {
            return Ok(None);
        }

        let keys = account_keys(&detail.transaction.transaction)?;
        let target_str = target.to_string();
        let Some(target_index) = keys.iter().position(|key| *key == target_str) else {
            return Ok(None);
        };

        let pre = self.balance_for(&meta.pre_token_balances, target_index);
        let post = self.balance_for(&meta.post_token_balances, target_index);
        let Some(reference) = post.or(pre) else {
            return Ok(None);
        };

        let pre_amount = pre.map(raw_amount).transpose()?.unwrap_or(0);
        let post_amount = post.map(raw_amount).transpose()?.unwrap_or(0);
        let delta = post_amount - pre_amount;
        if delta == 0 {
            return Ok(None);
        }
        let decimals = reference.ui_token_amount.decimals;
        let wallet = match &reference.owner {
            OptionSerializer::Some(owner) => owner.clone(),
            _ => String::new(),
        };

        Ok(Some(Trade {
            signature: first_signature(&detail.transaction.transaction)?,
            slot: detail.slot,
            block_time: detail.block_time,
            side: if delta > 0 { Side::Buy } else { Side::Sell },
            base_amount: delta.unsigned_abs() as f64 / 10f64.powi(decimals as i32),
            wallet,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    const MINT: &str = "So11111111111111111111111111111111111111112";
    const SIG: &str =
        "5VERYLongFakeSignature1111111111111111111111111111111111111111111111111111111111111";

    fn token_balance(account_index: u8, mint: &str, amount: &str, owner: &str) -> serde_json::Value {
        let decimals = 9u8;
        json!({
            "accountIndex": account_index,
            "mint": mint,
            "uiTokenAmount": {
                "uiAmount": amount.parse::<f64>().unwrap() / 1e9,
                "decimals": decimals,
                "amount": amount,
                "uiAmountString": amount,
            },
            "owner": owner,
            "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
        })
    }

    fn detail(
        slot: u64,
        keys: &[&str],
        pre: Vec<serde_json::Value>,
        post: Vec<serde_json::Value>,
        failed: bool,
    ) -> TransactionDetail {
        serde_json::from_value(json!({
            "slot": slot,
            "blockTime": 1_700_000_000i64,
            "transaction": {
                "signatures": [SIG],
                "message": {
                    "header": {
                        "numRequiredSignatures": 1,
                        "numReadonlySignedAccounts": 0,
                        "numReadonlyUnsignedAccounts": 0,
                    },
                    "accountKeys": keys,
                    "recentBlockhash": "11111111111111111111111111111111",
                    "instructions": [],
                },
            },
            "meta": {
                "err": if failed { json!("AccountNotFound") } else { json!(null) },
                "status": if failed { json!({"Err": "AccountNotFound"}) } else { json!({"Ok": null}) },
                "fee": 5000,
                "preBalances": [],
                "postBalances": [],
                "preTokenBalances": pre,
                "postTokenBalances": post,
            },
        }))
        .expect("valid transaction detail json")
    }

    fn target() -> Pubkey {
        Pubkey::from_str("4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T").unwrap()
    }

    #[test]
    fn test_buy_from_positive_delta() {
        let target = target();
        let target_str = target.to_string();
        let wallet = Pubkey::new_unique().to_string();
        let d = detail(
            500,
            &["payer11111111111111111111111111111111111111", &target_str],
            vec![token_balance(1, MINT, "1000000000", &wallet)],
            vec![token_balance(1, MINT, "3500000000", &wallet)],
            false,
        );

        let decoder = BalanceDeltaDecoder::new(MINT);
        let trade = decoder.decode(&d, &target).unwrap().unwrap();
        assert_eq!(trade.side, Side::Buy);
        assert!((trade.base_amount - 2.5).abs() < 1e-9);
        assert_eq!(trade.slot, 500);
        assert_eq!(trade.signature, SIG);
        assert_eq!(trade.wallet, wallet);
    }

    #[test]
    fn test_sell_from_negative_delta() {
        let target = target();
        let target_str = target.to_string();
        let d = detail(
            501,
            &[&target_str],
            vec![token_balance(0, MINT, "3500000000", "owner")],
            vec![token_balance(0, MINT, "1000000000", "owner")],
            false,
        );

        let trade = BalanceDeltaDecoder::new(MINT)
            .decode(&d, &target)
            .unwrap()
            .unwrap();
        assert_eq!(trade.side, Side::Sell);
        assert!((trade.base_amount - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_account_created_in_transaction() {
        // No pre balance entry at all: the whole post amount is the buy
        let target = target();
        let target_str = target.to_string();
        let d = detail(
            502,
            &[&target_str],
            vec![],
            vec![token_balance(0, MINT, "1000000000", "owner")],
            false,
        );

        let trade = BalanceDeltaDecoder::new(MINT)
            .decode(&d, &target)
            .unwrap()
            .unwrap();
        assert_eq!(trade.side, Side::Buy);
        assert!((trade.base_amount - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unchanged_balance_is_no_trade() {
        let target = target();
        let target_str = target.to_string();
        let d = detail(
            503,
            &[&target_str],
            vec![token_balance(0, MINT, "1000000000", "owner")],
            vec![token_balance(0, MINT, "1000000000", "owner")],
            false,
        );

        assert!(BalanceDeltaDecoder::new(MINT)
            .decode(&d, &target)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_uninvolved_account_is_no_trade() {
        let d = detail(
            504,
            &["somebody11111111111111111111111111111111111"],
            vec![],
            vec![token_balance(0, MINT, "1000000000", "owner")],
            false,
        );

        assert!(BalanceDeltaDecoder::new(MINT)
            .decode(&d, &target())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_other_mint_delta_ignored() {
        let target = target();
        let target_str = target.to_string();
        let other_mint = Pubkey::new_unique().to_string();
        let d = detail(
            505,
            &[&target_str],
            vec![token_balance(0, &other_mint, "1000000000", "owner")],
            vec![token_balance(0, &other_mint, "9000000000", "owner")],
            false,
        );

        assert!(BalanceDeltaDecoder::new(MINT)
            .decode(&d, &target)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_failed_transaction_is_no_trade() {
        let target = target();
        let target_str = target.to_string();
        let d = detail(
            506,
            &[&target_str],
            vec![token_balance(0, MINT, "1000000000", "owner")],
            vec![token_balance(0, MINT, "2000000000", "owner")],
            true,
        );

        assert!(BalanceDeltaDecoder::new(MINT)
            .decode(&d, &target)
            .unwrap()
            .is_none());
    }
}
