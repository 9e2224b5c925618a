// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! # Signing Capabilities
//!
//! Two distinct key roles exist in the service and they are deliberately
//! separate types so one can never be passed where the other belongs:
//!
//! - [`HotWalletKey`]: the operator's payout key, loaded from the
//!   environment. Withdrawals are broadcast from this wallet.
//! - [`SweepKey`]: a deposit-wallet key freshly unsealed by the vault.
//!   Sweeps drain the deposit address it controls into cold storage.

use alloy::network::EthereumWallet;
use alloy::signers::local::PrivateKeySigner;

use super::client::ChainError;

fn parse_signer(private_key_hex: &str) -> Result<PrivateKeySigner, ChainError> {
    let trimmed = private_key_hex.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);

    let key_bytes =
        alloy::hex::decode(stripped).map_err(|e| ChainError::InvalidPrivateKey(e.to_string()))?;

    PrivateKeySigner::from_slice(&key_bytes)
        .map_err(|e| ChainError::InvalidPrivateKey(e.to_string()))
}

/// The operator payout key used to settle approved withdrawals.
#[derive(Debug, Clone)]
pub struct HotWalletKey(PrivateKeySigner);

impl HotWalletKey {
    /// Parses the key from hex (with or without a `0x` prefix).
    pub fn from_hex(private_key_hex: &str) -> Result<Self, ChainError> {
        Ok(Self(parse_signer(private_key_hex)?))
    }

    /// Checksummed address of the hot wallet.
    pub fn address(&self) -> String {
        self.0.address().to_string()
    }

    /// Wallet for building signed transactions.
    pub fn to_wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.0.clone())
    }
}

/// A deposit-wallet key unsealed for a sweep.
#[derive(Debug, Clone)]
pub struct SweepKey(PrivateKeySigner);

impl SweepKey {
    /// Parses a vault-decrypted key from hex.
    pub fn from_decrypted_hex(private_key_hex: &str) -> Result<Self, ChainError> {
        Ok(Self(parse_signer(private_key_hex)?))
    }

    /// Checksummed address the key controls.
    pub fn address(&self) -> String {
        self.0.address().to_string()
    }

    /// Wallet for building signed transactions.
    pub fn to_wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.0.clone())
    }
}
