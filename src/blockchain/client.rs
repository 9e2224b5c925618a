// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! # EVM Network Client
//!
//! Read-side JSON-RPC client for one registry network plus the shared error
//! taxonomy for all on-chain operations. Every outbound RPC call is wrapped
//! in a fixed timeout so a stalled node cannot wedge the deposit watcher or
//! an operator action.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use alloy::{
    eips::BlockNumberOrTag,
    network::{Ethereum, EthereumWallet},
    primitives::{Address, U256},
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
};

use super::transactions::{FeeData, SendResult, TxBuilder};
use super::types::ChainConfig;
use super::ChainOps;

/// Ceiling for any single RPC round trip.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(15);

/// Base fee assumed when the latest block carries none (pre-1559 fields).
const DEFAULT_BASE_FEE: u128 = 25_000_000_000; // 25 gwei

/// Priority fee attached to every transaction.
const DEFAULT_PRIORITY_FEE: u128 = 1_500_000_000; // 1.5 gwei

/// HTTP provider type for read-only queries (with all fillers).
type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// Errors that can occur during on-chain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid transaction hash: {0}")]
    InvalidTxHash(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC call {0} timed out")]
    Timeout(&'static str),

    #[error("Broadcast failed: {0}")]
    Broadcast(String),
}

/// Runs an RPC future under [`RPC_TIMEOUT`], naming the call on expiry.
pub(crate) async fn with_timeout<T, F>(call: &'static str, fut: F) -> Result<T, ChainError>
where
    F: Future<Output = Result<T, ChainError>>,
{
    match tokio::time::timeout(RPC_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(ChainError::Timeout(call)),
    }
}

/// Read-side client for one registry network.
pub struct ChainClient {
    chain: &'static ChainConfig,
    provider: HttpProvider,
}

impl ChainClient {
    /// Connects a client to the network's configured RPC endpoint.
    pub fn connect(chain: &'static ChainConfig) -> Result<Self, ChainError> {
        let url: url::Url = chain
            .rpc_url
            .parse()
            .map_err(|e: url::ParseError| ChainError::InvalidRpcUrl(e.to_string()))?;

        let provider = ProviderBuilder::new().connect_http(url);

        Ok(Self { chain, provider })
    }
}

impl ChainOps for ChainClient {
    fn config(&self) -> &ChainConfig {
        self.chain
    }

    async fn native_balance(&self, address: &str) -> Result<U256, ChainError> {
        let addr = Address::from_str(address)
            .map_err(|e| ChainError::InvalidAddress(e.to_string()))?;

        with_timeout("get_balance", async {
            self.provider
                .get_balance(addr)
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))
        })
        .await
    }

    /// Reads the latest block's base fee and derives EIP-1559 fee caps.
    ///
    /// Max fee is `2 * base_fee + priority_fee`, leaving headroom for the
    /// base fee to rise before inclusion.
    async fn fee_data(&self) -> Result<FeeData, ChainError> {
        let block = with_timeout("get_block_by_number", async {
            self.provider
                .get_block_by_number(BlockNumberOrTag::Latest)
                .await
                .map_err(|e| ChainError::Rpc(format!("Failed to get block: {}", e)))
        })
        .await?
        .ok_or_else(|| ChainError::Rpc("No latest block".to_string()))?;

        let base_fee: u128 = block
            .header
            .base_fee_per_gas
            .map(|f| f as u128)
            .unwrap_or(DEFAULT_BASE_FEE);

        Ok(FeeData {
            max_fee_per_gas: base_fee
                .saturating_mul(2)
                .saturating_add(DEFAULT_PRIORITY_FEE),
            max_priority_fee_per_gas: DEFAULT_PRIORITY_FEE,
        })
    }

    async fn send_native(
        &self,
        wallet: EthereumWallet,
        to: &str,
        amount_wei: U256,
        fees: &FeeData,
        gas_limit: Option<u64>,
    ) -> Result<SendResult, ChainError> {
        let builder = TxBuilder::new(self.chain, wallet)?;
        builder.send_native(to, amount_wei, fees, gas_limit).await
    }

    /// Confirmation count for a mined transaction.
    ///
    /// Returns `None` while the transaction has no receipt, and also for
    /// reverted transactions, which must never be credited.
    async fn transaction_confirmations(&self, tx_hash: &str) -> Result<Option<u64>, ChainError> {
        let hash = tx_hash
            .parse()
            .map_err(|e| ChainError::InvalidTxHash(format!("{}: {}", tx_hash, e)))?;

        let receipt = with_timeout("get_transaction_receipt", async {
            self.provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| ChainError::Rpc(format!("Failed to get receipt: {}", e)))
        })
        .await?;

        let Some(receipt) = receipt else {
            return Ok(None);
        };
        if !receipt.status() {
            return Ok(None);
        }
        let Some(included_in) = receipt.block_number else {
            return Ok(None);
        };

        let head = with_timeout("get_block_number", async {
            self.provider
                .get_block_number()
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))
        })
        .await?;

        Ok(Some(head.saturating_sub(included_in).saturating_add(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::types::ETHEREUM;

    #[test]
    fn connect_accepts_registry_endpoints() {
        for chain in crate::blockchain::types::SUPPORTED_CHAINS {
            assert!(ChainClient::connect(chain).is_ok(), "{} failed", chain.id);
        }
    }

    #[test]
    fn config_round_trips() {
        let client = ChainClient::connect(&ETHEREUM).unwrap();
        assert_eq!(client.config().chain_id, 1);
    }

    #[tokio::test]
    async fn timeout_wrapper_passes_results_through() {
        let ok = with_timeout("noop", async { Ok::<_, ChainError>(7u64) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = with_timeout("noop", async {
            Err::<u64, _>(ChainError::Rpc("boom".to_string()))
        })
        .await;
        assert!(matches!(err, Err(ChainError::Rpc(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_wrapper_expires_stalled_calls() {
        let stalled = with_timeout("stalled_call", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, ChainError>(0u64)
        })
        .await;
        assert!(matches!(stalled, Err(ChainError::Timeout("stalled_call"))));
    }
}
