//! Collaborator seams for the trade discovery pipeline
//!
//! The RPC history source and the associated-token-account deriver are
//! consumed through traits so the pipeline can be exercised without a
//! validator. Production impls wrap the nonblocking Solana RPC client and
//! the SPL ATA derivation.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_rpc_client_api::response::RpcConfirmedTransactionStatusWithSignature;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, UiTransactionEncoding,
};

use crate::config::RpcConfig;
use crate::errors::{FeedError, FeedResult};
use crate::types::SignatureRecord;

/// Full transaction detail as delivered by the RPC node
pub type TransactionDetail = EncodedConfirmedTransactionWithStatusMeta;

/// Read-only view of an account's transaction history
#[async_trait]
pub trait SignatureHistory: Send + Sync {
    /// Signatures touching `account`, newest first from the node's view,
    /// starting strictly before `before` when given.
    async fn signatures_for_address(
        &self,
        account: &Pubkey,
        before: Option<Signature>,
        limit: usize,
    ) -> FeedResult<Vec<SignatureRecord>>;

    /// Full detail for one confirmed transaction.
    async fn transaction_detail(&self, signature: &str) -> FeedResult<TransactionDetail>;
}

/// Derives the account whose history the pipeline walks
pub trait AccountDeriver: Send + Sync {
    fn derive(&self, wallet: &Pubkey) -> FeedResult<Pubkey>;
}

/// SPL associated-token-account deriver for the tracked mint
#[derive(Debug)]
pub struct AtaDeriver {
    mint: Pubkey,
}

impl AtaDeriver {
    pub fn new(mint: &str) -> FeedResult<Self> {
        let mint = Pubkey::from_str(mint).map_err(|e| {
            FeedError::Configuration(format!("invalid tracked mint {}: {}", mint, e))
        })?;
        Ok(Self { mint })
    }

    pub fn mint(&self) -> &Pubkey {
        &self.mint
    }
}

impl AccountDeriver for AtaDeriver {
    fn derive(&self, wallet: &Pubkey) -> FeedResult<Pubkey> {
        Ok(spl_associated_token_account::get_associated_token_address(
            wallet, &self.mint,
        ))
    }
}

/// History source backed by a Solana RPC endpoint
pub struct RpcHistory {
    rpc: RpcClient,
    timeout: Duration,
}

impl RpcHistory {
    pub fn new(config: &RpcConfig) -> Self {
        Self {
            rpc: RpcClient::new(config.url.clone()),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl SignatureHistory for RpcHistory {
    async fn signatures_for_address(
        &self,
        account: &Pubkey,
        before: Option<Signature>,
        limit: usize,
    ) -> FeedResult<Vec<SignatureRecord>> {
        let config = GetConfirmedSignaturesForAddress2Config {
            before,
            until: None,
            limit: Some(limit),
            commitment: Some(CommitmentConfig::confirmed()),
        };

        let statuses: Vec<RpcConfirmedTransactionStatusWithSignature> = tokio::time::timeout(
            self.timeout,
            self.rpc.get_signatures_for_address_with_config(account, config),
        )
        .await
        .map_err(|_| FeedError::Network {
            operation: "get_signatures".to_string(),
            message: format!("timed out after {:?}", self.timeout),
        })?
        .map_err(|e| FeedError::from_client_error("get_signatures", e))?;

        Ok(statuses
            .into_iter()
            .map(|status| SignatureRecord {
                signature: status.signature,
                slot: status.slot,
                block_time: status.block_time,
                failed: status.err.is_some(),
            })
            .collect())
    }

    async fn transaction_detail(&self, signature: &str) -> FeedResult<TransactionDetail> {
        let signature = Signature::from_str(signature).map_err(|e| FeedError::Validation {
            operation: "get_transaction".to_string(),
            message: format!("invalid signature {}: {}", signature, e),
        })?;

        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };

        tokio::time::timeout(
            self.timeout,
            self.rpc.get_transaction_with_config(&signature, config),
        )
        .await
        .map_err(|_| FeedError::Network {
            operation: "get_transaction".to_string(),
            message: format!("timed out after {:?}", self.timeout),
        })?
        .map_err(|e| FeedError::from_client_error("get_transaction", e))
    }
}
