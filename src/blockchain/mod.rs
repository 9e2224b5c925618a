// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! Blockchain integration for the monitored EVM networks.
//!
//! This module provides:
//! - The static chain registry (RPC endpoints, confirmation depths, fees)
//! - A JSON-RPC client for balances, fees, receipts, and broadcasting
//! - The Etherscan-family explorer client the deposit watcher polls
//! - The hot-wallet and sweep signing capabilities

pub mod client;
pub mod explorer;
pub mod signing;
pub mod transactions;
pub mod types;

pub use client::{ChainClient, ChainError};
pub use explorer::{ExplorerClient, ExplorerError, ExplorerTransfer};
pub use signing::{HotWalletKey, SweepKey};
pub use transactions::{FeeData, SendResult};
pub use types::*;

use alloy::network::EthereumWallet;
use alloy::primitives::U256;

/// On-chain operations the withdrawal executor and sweep orchestrator run
/// against a network.
///
/// [`ChainClient`] is the live implementation; tests substitute doubles so
/// settlement logic can be exercised without an RPC endpoint.
pub(crate) trait ChainOps {
    /// Registry entry this client serves.
    fn config(&self) -> &ChainConfig;

    /// Native-asset balance of `address`, in wei.
    async fn native_balance(&self, address: &str) -> Result<U256, ChainError>;

    /// Current EIP-1559 fee caps.
    async fn fee_data(&self) -> Result<FeeData, ChainError>;

    /// Signs and broadcasts a native transfer with the given fee caps.
    async fn send_native(
        &self,
        wallet: EthereumWallet,
        to: &str,
        amount_wei: U256,
        fees: &FeeData,
        gas_limit: Option<u64>,
    ) -> Result<SendResult, ChainError>;

    /// Confirmation count for a mined, successful transaction. `None` while
    /// unmined or if the transaction reverted.
    async fn transaction_confirmations(&self, tx_hash: &str) -> Result<Option<u64>, ChainError>;
}
