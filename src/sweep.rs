// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! # Sweep Orchestrator
//!
//! Consolidates funds from deposit addresses into a treasury address. A
//! sweep walks every issued wallet across every supported network, decrypts
//! the per-address key, and sends the full spendable balance (balance minus
//! the gas reserve for one transfer) to the destination.
//!
//! Failures are contained per leg. One wallet with a corrupt key or one
//! network with a dead RPC never stops the rest of the run; the report
//! carries a status for every leg so the operator can retry selectively.

use std::collections::HashSet;
use std::sync::Arc;

use alloy::primitives::U256;
use serde::Serialize;
use utoipa::ToSchema;

use crate::blockchain::{
    transactions::{format_amount, NATIVE_DECIMALS},
    ChainClient, ChainError, ChainOps, SweepKey, SUPPORTED_CHAINS,
};
use crate::ledger::{DepositWallet, LedgerDb, LedgerError};
use crate::vault::KeyVault;

/// Gas for a plain native transfer. Sweeps never touch contracts, so the
/// intrinsic cost is exact and the limit can be pinned.
pub const SWEEP_GAS_LIMIT: u64 = 21_000;

/// Errors that abort a sweep before any leg runs.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("invalid destination address: {0}")]
    InvalidDestination(String),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Outcome of a single address-on-network sweep attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SweepStatus {
    /// Spendable balance broadcast to the destination.
    Sent,
    /// Zero balance, nothing to move.
    Empty,
    /// Balance would not cover the gas for its own transfer.
    InsufficientForGas,
    /// Key could not be recovered, no network was queried.
    Skipped,
    /// Balance lookup, fee lookup, or broadcast failed.
    Error,
}

/// One entry in a sweep report.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SweepLeg {
    pub address: String,
    /// Absent on `skipped` legs, where the failure precedes network work.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    pub status: SweepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Amount moved (for `sent`) or stranded (for `insufficient_for_gas`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SweepLeg {
    fn new(address: &str, network: Option<&str>, status: SweepStatus) -> Self {
        Self {
            address: address.to_string(),
            network: network.map(String::from),
            status,
            tx_hash: None,
            amount: None,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: String) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Result of a full sweep run.
#[derive(Debug, Serialize, ToSchema)]
pub struct SweepReport {
    /// Legs that broadcast a transfer.
    pub swept: usize,
    /// Total legs attempted.
    pub total: usize,
    pub results: Vec<SweepLeg>,
}

/// Walks deposit wallets and moves their balances to a treasury address.
pub struct SweepOrchestrator {
    ledger: Arc<LedgerDb>,
    vault: Arc<KeyVault>,
}

impl SweepOrchestrator {
    pub fn new(ledger: Arc<LedgerDb>, vault: Arc<KeyVault>) -> Self {
        Self { ledger, vault }
    }

    /// Sweeps every issued deposit address on every supported network.
    pub async fn sweep_all(&self, destination: &str) -> Result<SweepReport, SweepError> {
        if !crate::blockchain::is_valid_address(destination) {
            return Err(SweepError::InvalidDestination(destination.to_string()));
        }

        let mut clients = Vec::with_capacity(SUPPORTED_CHAINS.len());
        for chain in SUPPORTED_CHAINS {
            clients.push(ChainClient::connect(chain)?);
        }
        let wallets = self.ledger.all_wallets()?;

        tracing::info!(
            wallets = wallets.len(),
            networks = clients.len(),
            destination = %destination,
            "Sweep started"
        );
        Ok(self.execute(&clients, &wallets, destination).await)
    }

    /// Runs the sweep legs against the given chain clients.
    pub(crate) async fn execute<C: ChainOps>(
        &self,
        chains: &[C],
        wallets: &[DepositWallet],
        destination: &str,
    ) -> SweepReport {
        let mut results = Vec::new();
        let mut seen = HashSet::new();

        for wallet in wallets {
            if !seen.insert(wallet.address.to_lowercase()) {
                continue;
            }

            let key_hex = match self.vault.decrypt(&wallet.encrypted_private_key) {
                Ok(hex) => hex,
                Err(e) => {
                    tracing::warn!(
                        address = %wallet.address,
                        error = %e,
                        "Sweep skipping wallet, key recovery failed"
                    );
                    results.push(
                        SweepLeg::new(&wallet.address, None, SweepStatus::Skipped)
                            .with_detail(e.to_string()),
                    );
                    continue;
                }
            };
            let key = match SweepKey::from_decrypted_hex(&key_hex) {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!(
                        address = %wallet.address,
                        error = %e,
                        "Sweep skipping wallet, recovered key is unusable"
                    );
                    results.push(
                        SweepLeg::new(&wallet.address, None, SweepStatus::Skipped)
                            .with_detail(e.to_string()),
                    );
                    continue;
                }
            };

            for chain in chains {
                results.push(self.sweep_leg(chain, &key, &wallet.address, destination).await);
            }
        }

        let swept = results
            .iter()
            .filter(|leg| leg.status == SweepStatus::Sent)
            .count();
        let report = SweepReport {
            swept,
            total: results.len(),
            results,
        };
        tracing::info!(swept = report.swept, total = report.total, "Sweep finished");
        report
    }

    /// Attempts one address on one network.
    async fn sweep_leg<C: ChainOps>(
        &self,
        chain: &C,
        key: &SweepKey,
        address: &str,
        destination: &str,
    ) -> SweepLeg {
        let network = chain.config().id;

        let balance = match chain.native_balance(address).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(address = %address, network, error = %e, "Sweep balance lookup failed");
                return SweepLeg::new(address, Some(network), SweepStatus::Error)
                    .with_detail(e.to_string());
            }
        };
        if balance.is_zero() {
            return SweepLeg::new(address, Some(network), SweepStatus::Empty);
        }

        let fees = match chain.fee_data().await {
            Ok(fees) => fees,
            Err(e) => {
                tracing::warn!(address = %address, network, error = %e, "Sweep fee lookup failed");
                return SweepLeg::new(address, Some(network), SweepStatus::Error)
                    .with_detail(e.to_string());
            }
        };

        let gas_cost = U256::from(fees.max_fee_per_gas) * U256::from(SWEEP_GAS_LIMIT);
        if balance <= gas_cost {
            let mut leg = SweepLeg::new(address, Some(network), SweepStatus::InsufficientForGas);
            leg.amount = Some(format_amount(balance, NATIVE_DECIMALS));
            return leg;
        }

        let spendable = balance - gas_cost;
        match chain
            .send_native(key.to_wallet(), destination, spendable, &fees, Some(SWEEP_GAS_LIMIT))
            .await
        {
            Ok(result) => {
                let amount = format_amount(spendable, NATIVE_DECIMALS);
                tracing::info!(
                    address = %address,
                    network,
                    tx_hash = %result.tx_hash,
                    amount = %amount,
                    "Sweep transfer broadcast"
                );
                let mut leg = SweepLeg::new(address, Some(network), SweepStatus::Sent);
                leg.tx_hash = Some(result.tx_hash);
                leg.amount = Some(amount);
                leg
            }
            Err(e) => {
                tracing::warn!(address = %address, network, error = %e, "Sweep broadcast failed");
                SweepLeg::new(address, Some(network), SweepStatus::Error).with_detail(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::types::{ChainConfig, BSC, ETHEREUM};
    use crate::blockchain::{FeeData, SendResult};
    use crate::vault::generate_wallet;
    use alloy::network::EthereumWallet;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const DEST: &str = "0x9999999999999999999999999999999999999999";

    // 30 gwei cap over 21_000 gas
    const GAS_COST_WEI: u128 = 30_000_000_000 * 21_000;

    struct FakeChain {
        chain: &'static ChainConfig,
        balances: HashMap<String, U256>,
        fail_balance: bool,
        fail_send: bool,
        sent: Mutex<Vec<(String, U256, Option<u64>)>>,
    }

    impl FakeChain {
        fn new(chain: &'static ChainConfig) -> Self {
            Self {
                chain,
                balances: HashMap::new(),
                fail_balance: false,
                fail_send: false,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn with_balance(mut self, address: &str, wei: u128) -> Self {
            self.balances.insert(address.to_lowercase(), U256::from(wei));
            self
        }
    }

    impl ChainOps for FakeChain {
        fn config(&self) -> &ChainConfig {
            self.chain
        }

        async fn native_balance(&self, address: &str) -> Result<U256, ChainError> {
            if self.fail_balance {
                return Err(ChainError::Rpc("balance lookup failed".to_string()));
            }
            Ok(self
                .balances
                .get(&address.to_lowercase())
                .copied()
                .unwrap_or(U256::ZERO))
        }

        async fn fee_data(&self) -> Result<FeeData, ChainError> {
            Ok(FeeData {
                max_fee_per_gas: 30_000_000_000,
                max_priority_fee_per_gas: 1_500_000_000,
            })
        }

        async fn send_native(
            &self,
            _wallet: EthereumWallet,
            to: &str,
            amount_wei: U256,
            _fees: &FeeData,
            gas_limit: Option<u64>,
        ) -> Result<SendResult, ChainError> {
            if self.fail_send {
                return Err(ChainError::Broadcast("node rejected transaction".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), amount_wei, gas_limit));
            Ok(SendResult {
                tx_hash: format!("0xsweep{}", self.sent.lock().unwrap().len()),
            })
        }

        async fn transaction_confirmations(&self, _tx_hash: &str) -> Result<Option<u64>, ChainError> {
            Ok(None)
        }
    }

    fn orchestrator() -> (SweepOrchestrator, Arc<KeyVault>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(LedgerDb::open(dir.path()).unwrap());
        let vault = Arc::new(KeyVault::new("sweep-test-secret"));
        (SweepOrchestrator::new(ledger, vault.clone()), vault, dir)
    }

    fn wallet_row(vault: &KeyVault, user_id: &str) -> DepositWallet {
        let generated = generate_wallet();
        DepositWallet {
            user_id: user_id.to_string(),
            currency: "ETH".to_string(),
            address: generated.address,
            encrypted_private_key: vault.encrypt(&generated.private_key_hex).unwrap(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn legs_classify_empty_dust_and_funded_addresses() {
        let (orchestrator, vault, _dir) = orchestrator();

        let empty = wallet_row(&vault, "user-empty");
        let dust = wallet_row(&vault, "user-dust");
        let funded = wallet_row(&vault, "user-funded");

        let chain = FakeChain::new(&ETHEREUM)
            .with_balance(&dust.address, 100_000_000_000_000) // 0.0001 ETH
            .with_balance(&funded.address, 1_000_000_000_000_000_000); // 1 ETH
        let wallets = vec![empty.clone(), dust.clone(), funded.clone()];

        let report = orchestrator.execute(&[chain], &wallets, DEST).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.swept, 1);

        let by_address = |address: &str| {
            report
                .results
                .iter()
                .find(|leg| leg.address == *address)
                .unwrap()
        };
        assert_eq!(by_address(&empty.address).status, SweepStatus::Empty);
        assert_eq!(
            by_address(&dust.address).status,
            SweepStatus::InsufficientForGas
        );

        let sent = by_address(&funded.address);
        assert_eq!(sent.status, SweepStatus::Sent);
        assert_eq!(sent.network.as_deref(), Some("ethereum"));
        assert!(sent.tx_hash.is_some());
        assert_eq!(
            sent.amount.as_deref(),
            Some(format_amount(U256::from(1_000_000_000_000_000_000u128 - GAS_COST_WEI), 18).as_str())
        );
    }

    #[tokio::test]
    async fn spendable_amount_reserves_the_gas_cost() {
        let (orchestrator, vault, _dir) = orchestrator();
        let funded = wallet_row(&vault, "user-1");

        let chain =
            FakeChain::new(&ETHEREUM).with_balance(&funded.address, 2_000_000_000_000_000_000);
        let report = orchestrator
            .execute(std::slice::from_ref(&chain), &[funded], DEST)
            .await;
        assert_eq!(report.swept, 1);

        let sent = chain.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, DEST);
        assert_eq!(
            sent[0].1,
            U256::from(2_000_000_000_000_000_000u128 - GAS_COST_WEI)
        );
        assert_eq!(sent[0].2, Some(SWEEP_GAS_LIMIT));
    }

    #[tokio::test]
    async fn unrecoverable_keys_skip_once_without_touching_networks() {
        let (orchestrator, vault, _dir) = orchestrator();

        let mut garbled = wallet_row(&vault, "user-garbled");
        garbled.encrypted_private_key = "not:a:payload".to_string();

        let other_vault = KeyVault::new("some-other-secret");
        let foreign = wallet_row(&other_vault, "user-foreign");

        let healthy = wallet_row(&vault, "user-healthy");

        // Two networks, so a healthy wallet yields two legs while a skipped
        // wallet yields exactly one
        let chains = vec![FakeChain::new(&ETHEREUM), FakeChain::new(&BSC)];
        let wallets = vec![garbled.clone(), foreign.clone(), healthy];

        let report = orchestrator.execute(&chains, &wallets, DEST).await;
        assert_eq!(report.total, 4);
        assert_eq!(report.swept, 0);

        for skipped_address in [&garbled.address, &foreign.address] {
            let legs: Vec<_> = report
                .results
                .iter()
                .filter(|leg| leg.address == *skipped_address)
                .collect();
            assert_eq!(legs.len(), 1);
            assert_eq!(legs[0].status, SweepStatus::Skipped);
            assert!(legs[0].network.is_none());
            assert!(legs[0].detail.is_some());
        }
    }

    #[tokio::test]
    async fn chain_failures_become_error_legs() {
        let (orchestrator, vault, _dir) = orchestrator();
        let funded = wallet_row(&vault, "user-1");

        let mut unreachable = FakeChain::new(&ETHEREUM);
        unreachable.fail_balance = true;
        let report = orchestrator
            .execute(&[unreachable], std::slice::from_ref(&funded), DEST)
            .await;
        assert_eq!(report.results[0].status, SweepStatus::Error);
        assert!(report.results[0].detail.as_deref().unwrap().contains("balance"));

        let mut rejecting =
            FakeChain::new(&ETHEREUM).with_balance(&funded.address, 1_000_000_000_000_000_000);
        rejecting.fail_send = true;
        let report = orchestrator.execute(&[rejecting], &[funded], DEST).await;
        assert_eq!(report.results[0].status, SweepStatus::Error);
        assert_eq!(report.swept, 0);
    }

    #[tokio::test]
    async fn duplicate_addresses_are_swept_once() {
        let (orchestrator, vault, _dir) = orchestrator();
        let wallet = wallet_row(&vault, "user-1");

        let mut upper = wallet.clone();
        upper.currency = "BNB".to_string();
        upper.address = wallet.address.to_uppercase().replace("0X", "0x");

        let chain = FakeChain::new(&ETHEREUM).with_balance(&wallet.address, 1_000_000_000_000_000_000);
        let report = orchestrator.execute(&[chain], &[wallet, upper], DEST).await;

        assert_eq!(report.total, 1);
        assert_eq!(report.swept, 1);
    }

    #[tokio::test]
    async fn destination_is_validated_before_any_work() {
        let (orchestrator, _vault, _dir) = orchestrator();
        let err = orchestrator.sweep_all("treasury").await.unwrap_err();
        assert!(matches!(err, SweepError::InvalidDestination(_)));
    }

    #[test]
    fn report_serializes_with_snake_case_statuses() {
        let report = SweepReport {
            swept: 1,
            total: 2,
            results: vec![
                SweepLeg {
                    address: "0xabc".to_string(),
                    network: Some("ethereum".to_string()),
                    status: SweepStatus::Sent,
                    tx_hash: Some("0x1".to_string()),
                    amount: Some("0.5".to_string()),
                    detail: None,
                },
                SweepLeg::new("0xdef", Some("bsc"), SweepStatus::InsufficientForGas),
            ],
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["swept"], 1);
        assert_eq!(value["results"][0]["status"], "sent");
        assert_eq!(value["results"][1]["status"], "insufficient_for_gas");
        // Absent optionals are omitted, not null
        assert!(value["results"][1].get("tx_hash").is_none());
    }
}
