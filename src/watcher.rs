// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! # Deposit Watcher
//!
//! Background task that polls the explorer APIs for inbound transfers to
//! every issued deposit address, applies what it finds to the ledger, and
//! re-checks lingering `confirming` deposits over RPC when the explorer
//! stops returning them.
//!
//! Ticks never overlap: each scan runs to completion before the next
//! interval starts. A failure against one address on one network is logged
//! and contained; the rest of the tick proceeds.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::blockchain::{
    config_for, transactions::wei_to_ledger_units, ChainClient, ChainConfig, ChainError,
    ChainOps, ExplorerClient, ExplorerError, ExplorerTransfer, SUPPORTED_CHAINS,
};
use crate::ledger::{
    DepositObservation, DepositOutcome, DepositWallet, LedgerDb, LedgerError, Transaction,
    TxKind, TxStatus,
};

/// Poll interval when `DEPOSIT_POLL_SECS` is not set.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Errors surfaced by a watcher tick.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("explorer error: {0}")]
    Explorer(#[from] ExplorerError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Background deposit scanner.
pub struct DepositWatcher {
    ledger: Arc<LedgerDb>,
    explorer: ExplorerClient,
    poll_interval: Duration,
}

impl DepositWatcher {
    pub fn new(ledger: Arc<LedgerDb>, explorer: ExplorerClient, poll_interval: Duration) -> Self {
        Self {
            ledger,
            explorer,
            poll_interval,
        }
    }

    /// Runs the scan loop until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            interval_secs = self.poll_interval.as_secs(),
            networks = SUPPORTED_CHAINS.len(),
            "Deposit watcher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                tracing::info!("Deposit watcher shutting down");
                return;
            }

            if let Err(e) = self.tick().await {
                tracing::warn!(error = %e, "Deposit scan failed, will retry");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("Deposit watcher shutting down");
                    return;
                }
            }
        }
    }

    /// One full scan: every issued address on every configured network,
    /// then an RPC re-check of confirming deposits the scan did not see.
    async fn tick(&self) -> Result<(), WatcherError> {
        let wallets = self.ledger.all_wallets()?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut scanned: HashSet<String> = HashSet::new();

        for wallet in &wallets {
            if !scanned.insert(wallet.address.to_lowercase()) {
                continue;
            }
            for chain in SUPPORTED_CHAINS {
                match self.scan_address(chain, wallet).await {
                    Ok(hashes) => seen.extend(hashes),
                    Err(e) => {
                        tracing::warn!(
                            address = %wallet.address,
                            network = chain.id,
                            error = %e,
                            "Address scan failed"
                        );
                    }
                }
            }
        }

        self.recheck_confirming(&seen).await?;

        tracing::debug!(addresses = scanned.len(), observed = seen.len(), "Deposit scan complete");
        Ok(())
    }

    /// Scans one address on one network and applies every inbound credit
    /// candidate to the ledger. Returns the hashes it observed.
    async fn scan_address(
        &self,
        chain: &'static ChainConfig,
        wallet: &DepositWallet,
    ) -> Result<Vec<String>, WatcherError> {
        let head = self.explorer.block_number(chain).await?;
        let transfers = self.explorer.address_transactions(chain, &wallet.address).await?;

        let mut seen = Vec::new();
        for transfer in transfers {
            if !is_inbound_credit(&transfer, &wallet.address) {
                continue;
            }

            let amount = wei_to_ledger_units(transfer.value);
            if amount == "0" {
                // Dust below ledger precision has nothing to credit
                continue;
            }

            seen.push(transfer.hash.to_lowercase());

            let obs = DepositObservation {
                user_id: wallet.user_id.clone(),
                currency: wallet.currency.clone(),
                network: chain.id.to_string(),
                tx_hash: transfer.hash.clone(),
                from_address: transfer.from.clone(),
                to_address: transfer.to.clone(),
                amount,
                confirmations: confirmations_for(head, transfer.block_number),
                required_confirmations: chain.required_confirmations,
            };

            match self.ledger.apply_deposit(&obs) {
                Ok(DepositOutcome::Recorded) => tracing::info!(
                    tx_hash = %obs.tx_hash,
                    network = chain.id,
                    user_id = %obs.user_id,
                    confirmations = obs.confirmations,
                    required = obs.required_confirmations,
                    "Deposit observed, awaiting confirmations"
                ),
                Ok(DepositOutcome::Credited | DepositOutcome::Promoted) => tracing::info!(
                    tx_hash = %obs.tx_hash,
                    user_id = %obs.user_id,
                    amount = %obs.amount,
                    currency = %obs.currency,
                    "Deposit credited"
                ),
                Ok(DepositOutcome::Updated) => tracing::debug!(
                    tx_hash = %obs.tx_hash,
                    confirmations = obs.confirmations,
                    "Deposit confirmations advanced"
                ),
                Ok(DepositOutcome::Unchanged) => {}
                Err(e) => tracing::warn!(
                    tx_hash = %obs.tx_hash,
                    error = %e,
                    "Failed to apply deposit"
                ),
            }
        }
        Ok(seen)
    }

    /// Re-checks confirming deposits the explorer scan did not surface
    /// this tick, straight against the chain's RPC receipt.
    async fn recheck_confirming(&self, seen: &HashSet<String>) -> Result<(), WatcherError> {
        let confirming = self
            .ledger
            .transactions_with_status(TxKind::Deposit, TxStatus::Confirming)?;

        for tx in confirming {
            let Some(hash) = tx.tx_hash.clone() else {
                continue;
            };
            if seen.contains(&hash.to_lowercase()) {
                continue;
            }
            let Some(chain) = config_for(&tx.network) else {
                tracing::warn!(tx_hash = %hash, network = %tx.network, "Confirming deposit on unknown network");
                continue;
            };

            match self.recheck_via_rpc(chain, &tx, &hash).await {
                Ok(Some(DepositOutcome::Promoted)) => {
                    tracing::info!(tx_hash = %hash, user_id = %tx.user_id, "Deposit credited on re-check");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    tx_hash = %hash,
                    network = %tx.network,
                    error = %e,
                    "Deposit re-check failed"
                ),
            }
        }
        Ok(())
    }

    async fn recheck_via_rpc(
        &self,
        chain: &'static ChainConfig,
        tx: &Transaction,
        hash: &str,
    ) -> Result<Option<DepositOutcome>, WatcherError> {
        let client = ChainClient::connect(chain)?;
        let Some(confirmations) = client.transaction_confirmations(hash).await? else {
            return Ok(None);
        };

        let obs = DepositObservation {
            user_id: tx.user_id.clone(),
            currency: tx.currency.clone(),
            network: tx.network.clone(),
            tx_hash: hash.to_string(),
            from_address: tx.from_address.clone().unwrap_or_default(),
            to_address: tx.to_address.clone().unwrap_or_default(),
            amount: tx.amount.clone(),
            confirmations,
            required_confirmations: tx.required_confirmations,
        };
        Ok(Some(self.ledger.apply_deposit(&obs)?))
    }
}

/// Whether a history entry is a candidate deposit: inbound to the scanned
/// address, successful, and carrying value.
fn is_inbound_credit(transfer: &ExplorerTransfer, address: &str) -> bool {
    !transfer.failed
        && !transfer.value.is_zero()
        && transfer.to.eq_ignore_ascii_case(address)
}

/// Confirmation count with the transaction's own block included.
fn confirmations_for(head: u64, block_number: u64) -> u64 {
    head.saturating_sub(block_number).saturating_add(1)
}
