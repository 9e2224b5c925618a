// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! # Chain Registry
//!
//! Static configuration for every EVM network the service monitors. Each
//! entry carries the RPC endpoint, the explorer API endpoint, the native
//! currency code, the confirmation depth required before a deposit is
//! credited, and the operator-facing deposit/withdrawal policy values.
//!
//! Policy amounts (`min_deposit`, `min_withdrawal`, `withdrawal_fee`) are
//! decimal strings in native units so they survive config review without
//! unit mistakes; they are parsed at the point of use.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Confirmation depth assumed for networks missing from the registry.
pub const DEFAULT_REQUIRED_CONFIRMATIONS: u64 = 12;

/// Static configuration for one monitored EVM network.
#[derive(Debug, Clone, Copy)]
pub struct ChainConfig {
    /// Registry identifier, used as the `network` field on ledger records.
    pub id: &'static str,
    /// Human-readable network name.
    pub name: &'static str,
    /// EVM chain ID.
    pub chain_id: u64,
    /// JSON-RPC endpoint.
    pub rpc_url: &'static str,
    /// Etherscan-family explorer API endpoint.
    pub explorer_api_url: &'static str,
    /// Native currency code credited for deposits on this network.
    pub native_currency: &'static str,
    /// Blocks required before a deposit is considered final.
    pub required_confirmations: u64,
    /// Smallest deposit the operator advertises, in native units.
    pub min_deposit: &'static str,
    /// Smallest withdrawal accepted, in native units.
    pub min_withdrawal: &'static str,
    /// Flat fee deducted from every withdrawal, in native units.
    pub withdrawal_fee: &'static str,
}

/// Ethereum mainnet.
pub const ETHEREUM: ChainConfig = ChainConfig {
    id: "ethereum",
    name: "Ethereum Mainnet",
    chain_id: 1,
    rpc_url: "https://ethereum-rpc.publicnode.com",
    explorer_api_url: "https://api.etherscan.io/api",
    native_currency: "ETH",
    required_confirmations: 12,
    min_deposit: "0.001",
    min_withdrawal: "0.01",
    withdrawal_fee: "0.0005",
};

/// BNB Smart Chain mainnet.
pub const BSC: ChainConfig = ChainConfig {
    id: "bsc",
    name: "BNB Smart Chain",
    chain_id: 56,
    rpc_url: "https://bsc-rpc.publicnode.com",
    explorer_api_url: "https://api.bscscan.com/api",
    native_currency: "BNB",
    required_confirmations: 15,
    min_deposit: "0.005",
    min_withdrawal: "0.02",
    withdrawal_fee: "0.001",
};

/// Polygon PoS mainnet.
pub const POLYGON: ChainConfig = ChainConfig {
    id: "polygon",
    name: "Polygon PoS",
    chain_id: 137,
    rpc_url: "https://polygon-bor-rpc.publicnode.com",
    explorer_api_url: "https://api.polygonscan.com/api",
    native_currency: "POL",
    required_confirmations: 30,
    min_deposit: "1",
    min_withdrawal: "5",
    withdrawal_fee: "0.1",
};

/// Every network the deposit watcher scans and the API accepts.
pub const SUPPORTED_CHAINS: &[ChainConfig] = &[ETHEREUM, BSC, POLYGON];

/// Looks up a network by registry id, case-insensitively.
pub fn config_for(network: &str) -> Option<&'static ChainConfig> {
    SUPPORTED_CHAINS
        .iter()
        .find(|chain| chain.id.eq_ignore_ascii_case(network))
}

/// Confirmation depth for a network, falling back to
/// [`DEFAULT_REQUIRED_CONFIRMATIONS`] for anything not in the registry.
pub fn required_confirmations(network: &str) -> u64 {
    config_for(network)
        .map(|chain| chain.required_confirmations)
        .unwrap_or(DEFAULT_REQUIRED_CONFIRMATIONS)
}

/// Validates a `0x`-prefixed 20-byte hex address.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Public view of one registry entry, returned by the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NetworkSummary {
    /// Registry identifier.
    pub id: String,
    /// Human-readable network name.
    pub name: String,
    /// Native currency code.
    pub currency: String,
    /// Blocks required before a deposit is credited.
    pub required_confirmations: u64,
    /// Minimum advertised deposit, native units.
    pub min_deposit: String,
    /// Minimum accepted withdrawal, native units.
    pub min_withdrawal: String,
    /// Flat withdrawal fee, native units.
    pub withdrawal_fee: String,
}

impl From<&ChainConfig> for NetworkSummary {
    fn from(chain: &ChainConfig) -> Self {
        Self {
            id: chain.id.to_string(),
            name: chain.name.to_string(),
            currency: chain.native_currency.to_string(),
            required_confirmations: chain.required_confirmations,
            min_deposit: chain.min_deposit.to_string(),
            min_withdrawal: chain.min_withdrawal.to_string(),
            withdrawal_fee: chain.withdrawal_fee.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup_is_case_insensitive() {
        assert_eq!(config_for("ethereum").map(|c| c.chain_id), Some(1));
        assert_eq!(config_for("Ethereum").map(|c| c.chain_id), Some(1));
        assert_eq!(config_for("BSC").map(|c| c.chain_id), Some(56));
        assert!(config_for("dogecoin").is_none());
    }

    #[test]
    fn unknown_networks_fall_back_to_default_depth() {
        assert_eq!(required_confirmations("polygon"), 30);
        assert_eq!(
            required_confirmations("unknown-net"),
            DEFAULT_REQUIRED_CONFIRMATIONS
        );
    }

    #[test]
    fn native_currencies_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for chain in SUPPORTED_CHAINS {
            assert!(
                seen.insert(chain.native_currency),
                "duplicate native currency {}",
                chain.native_currency
            );
        }
    }

    #[test]
    fn address_validation() {
        assert!(is_valid_address(
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        ));
        assert!(!is_valid_address("7E5F4552091A69125d5DfCb7b8C2659029395Bdf"));
        assert!(!is_valid_address("0x7E5F"));
        assert!(!is_valid_address(
            "0xZZ5F4552091A69125d5DfCb7b8C2659029395Bdf"
        ));
    }
}
