// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! Transaction building and broadcasting for the monitored EVM networks.
//!
//! This module provides EIP-1559 transaction building for native-asset
//! transfers, plus the amount conversions between human-readable decimal
//! strings, wei, and the ledger's 8-decimal representation.

use std::str::FromStr;

use alloy::{
    network::EthereumWallet,
    primitives::{Address, U256},
    providers::{Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
};

use super::client::{with_timeout, ChainError};
use super::types::ChainConfig;

/// Decimals of the native asset on every supported network.
pub const NATIVE_DECIMALS: u8 = 18;

/// Decimals carried by ledger balances and transaction amounts.
pub const LEDGER_DECIMALS: u8 = 8;

/// EIP-1559 fee caps read once per operation and reused for every
/// transaction built from them.
#[derive(Debug, Clone, Copy)]
pub struct FeeData {
    /// Max fee per gas (base fee headroom + tip).
    pub max_fee_per_gas: u128,
    /// Max priority fee per gas (tip).
    pub max_priority_fee_per_gas: u128,
}

/// Transaction send result.
#[derive(Debug, Clone)]
pub struct SendResult {
    /// Transaction hash, `0x`-prefixed.
    pub tx_hash: String,
}

/// Signing transaction builder for one registry network.
pub struct TxBuilder {
    provider: alloy::providers::fillers::FillProvider<
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::JoinFill<
                alloy::providers::Identity,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::GasFiller,
                    alloy::providers::fillers::JoinFill<
                        alloy::providers::fillers::BlobGasFiller,
                        alloy::providers::fillers::JoinFill<
                            alloy::providers::fillers::NonceFiller,
                            alloy::providers::fillers::ChainIdFiller,
                        >,
                    >,
                >,
            >,
            alloy::providers::fillers::WalletFiller<EthereumWallet>,
        >,
        alloy::providers::RootProvider<alloy::network::Ethereum>,
    >,
}

impl TxBuilder {
    /// Creates a builder that signs with `wallet` against the network's RPC
    /// endpoint.
    pub fn new(chain: &ChainConfig, wallet: EthereumWallet) -> Result<Self, ChainError> {
        let url: url::Url = chain
            .rpc_url
            .parse()
            .map_err(|e: url::ParseError| ChainError::InvalidRpcUrl(e.to_string()))?;

        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);

        Ok(Self { provider })
    }

    /// Broadcasts a native-asset transfer.
    ///
    /// Fee caps come from the caller so the cost the caller budgeted for is
    /// exactly the cost the transaction can incur. When `gas_limit` is
    /// `None` the node's estimate is used.
    pub async fn send_native(
        &self,
        to: &str,
        amount_wei: U256,
        fees: &FeeData,
        gas_limit: Option<u64>,
    ) -> Result<SendResult, ChainError> {
        let to_addr = Address::from_str(to)
            .map_err(|e| ChainError::InvalidAddress(format!("Invalid to address: {}", e)))?;

        let mut tx = TransactionRequest::default()
            .to(to_addr)
            .value(amount_wei)
            .max_fee_per_gas(fees.max_fee_per_gas)
            .max_priority_fee_per_gas(fees.max_priority_fee_per_gas);

        if let Some(limit) = gas_limit {
            tx = tx.gas_limit(limit);
        }

        let pending = with_timeout("send_transaction", async {
            self.provider
                .send_transaction(tx)
                .await
                .map_err(|e| ChainError::Broadcast(e.to_string()))
        })
        .await?;

        Ok(SendResult {
            tx_hash: format!("{:?}", pending.tx_hash()),
        })
    }
}

/// Parse a human-readable decimal amount into its smallest unit.
///
/// `decimals` is 18 for wei and 8 for ledger units. Rejects signs, extra
/// dots, and precision beyond `decimals`.
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256, ChainError> {
    let malformed = || ChainError::InvalidAmount(format!("malformed amount `{amount}`"));

    let (whole_str, frac_str) = match amount.split_once('.') {
        None => (amount, ""),
        Some((whole, frac)) if !frac.contains('.') => (whole, frac),
        Some(_) => return Err(malformed()),
    };

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if whole_str.is_empty() || !all_digits(whole_str) || !all_digits(frac_str) {
        return Err(malformed());
    }
    if frac_str.len() > decimals as usize {
        return Err(ChainError::InvalidAmount(format!(
            "amount `{amount}` exceeds {decimals} decimal places"
        )));
    }

    let overflow = || ChainError::InvalidAmount(format!("amount `{amount}` overflows"));
    let whole: u128 = whole_str.parse().map_err(|_| overflow())?;
    let frac: u128 = if frac_str.is_empty() {
        0
    } else {
        let digits: u128 = frac_str.parse().map_err(|_| overflow())?;
        digits * 10u128.pow(decimals as u32 - frac_str.len() as u32)
    };

    whole
        .checked_mul(10u128.pow(decimals as u32))
        .and_then(|scaled| scaled.checked_add(frac))
        .map(U256::from)
        .ok_or_else(overflow)
}

/// Format a smallest-unit amount as a human-readable decimal string,
/// trimming trailing fractional zeros.
pub fn format_amount(amount: U256, decimals: u8) -> String {
    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / divisor;
    let frac = amount % divisor;

    if frac.is_zero() {
        return whole.to_string();
    }

    let frac_str = format!("{frac:0>width$}", width = decimals as usize);
    let trimmed = frac_str.trim_end_matches('0');
    format!("{whole}.{trimmed}")
}

/// Converts a wei value into the ledger's 8-decimal representation,
/// truncating anything finer.
pub fn wei_to_ledger_units(value: U256) -> String {
    let drop = (NATIVE_DECIMALS - LEDGER_DECIMALS) as u64;
    let truncated = value / U256::from(10u64).pow(U256::from(drop));
    format_amount(truncated, LEDGER_DECIMALS)
}
