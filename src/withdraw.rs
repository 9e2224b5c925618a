// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! # Withdrawal Executor
//!
//! Runs the withdrawal lifecycle: validated submission with an optimistic
//! debit of the full amount, then operator settlement. An approval either
//! records an operator-supplied hash verbatim (for payouts settled outside
//! the service) or broadcasts `amount - fee` from the hot wallet; a
//! rejection returns the full amount to the user.
//!
//! A failed broadcast leaves the record pending and the debit in place, so
//! the operator can retry or reject once the cause is known.

use std::sync::Arc;

use crate::blockchain::{
    config_for, is_valid_address,
    transactions::{parse_amount, NATIVE_DECIMALS},
    ChainClient, ChainError, ChainOps, HotWalletKey,
};
use crate::config;
use crate::ledger::amount::{self, AmountError};
use crate::ledger::{LedgerDb, LedgerError, Transaction, TxKind, TxStatus};

/// Errors produced by withdrawal operations.
#[derive(Debug, thiserror::Error)]
pub enum WithdrawError {
    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    #[error("currency {currency} is not the native asset of network {network}")]
    CurrencyMismatch { currency: String, network: String },

    #[error("invalid destination address: {0}")]
    InvalidDestination(String),

    #[error("amount {amount} is below the minimum withdrawal of {minimum} {currency}")]
    BelowMinimum {
        amount: String,
        minimum: String,
        currency: String,
    },

    #[error("amount {amount} does not cover the {fee} {currency} withdrawal fee")]
    FeeExceedsAmount {
        amount: String,
        fee: String,
        currency: String,
    },

    #[error("hot wallet signing key is not configured")]
    NoHotWallet,

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("amount error: {0}")]
    Amount(#[from] AmountError),
}

/// Validates a withdrawal amount against network policy.
///
/// Returns `(amount_units, net_units)` where net is what the hot wallet
/// would actually pay out.
fn validate_amount(
    amount_str: &str,
    min_withdrawal: &str,
    withdrawal_fee: &str,
    currency: &str,
    scale: u32,
) -> Result<(u128, u128), WithdrawError> {
    let amount_units = amount::parse_units(amount_str, scale)?;
    let min_units = amount::parse_units(min_withdrawal, scale)?;
    let fee_units = amount::parse_units(withdrawal_fee, scale)?;

    if amount_units < min_units {
        return Err(WithdrawError::BelowMinimum {
            amount: amount_str.to_string(),
            minimum: min_withdrawal.to_string(),
            currency: currency.to_string(),
        });
    }
    if amount_units <= fee_units {
        return Err(WithdrawError::FeeExceedsAmount {
            amount: amount_str.to_string(),
            fee: withdrawal_fee.to_string(),
            currency: currency.to_string(),
        });
    }

    Ok((amount_units, amount_units - fee_units))
}

/// Submits, settles, and rejects withdrawals.
pub struct WithdrawalExecutor {
    ledger: Arc<LedgerDb>,
    hot_wallet_key: Option<String>,
}

impl WithdrawalExecutor {
    pub fn new(ledger: Arc<LedgerDb>, hot_wallet_key: Option<String>) -> Self {
        Self {
            ledger,
            hot_wallet_key,
        }
    }

    /// Builds an executor with the hot wallet key from `HOT_WALLET_KEY`.
    pub fn from_env(ledger: Arc<LedgerDb>) -> Self {
        Self::new(ledger, config::hot_wallet_key())
    }

    /// Whether automated payouts are possible.
    pub fn can_broadcast(&self) -> bool {
        self.hot_wallet_key.is_some()
    }

    /// Validates and submits a withdrawal, debiting the full amount.
    ///
    /// The record carries a fee breakdown note so the operator sees the
    /// planned net payout in the review queue.
    pub fn request(
        &self,
        user_id: &str,
        currency: &str,
        amount_str: &str,
        network: &str,
        destination: &str,
    ) -> Result<Transaction, WithdrawError> {
        let chain =
            config_for(network).ok_or_else(|| WithdrawError::UnknownNetwork(network.to_string()))?;

        if !currency.eq_ignore_ascii_case(chain.native_currency) {
            return Err(WithdrawError::CurrencyMismatch {
                currency: currency.to_string(),
                network: chain.id.to_string(),
            });
        }
        if !is_valid_address(destination) {
            return Err(WithdrawError::InvalidDestination(destination.to_string()));
        }

        let scale = amount::scale_for(chain.native_currency);
        let (amount_units, net_units) = validate_amount(
            amount_str,
            chain.min_withdrawal,
            chain.withdrawal_fee,
            chain.native_currency,
            scale,
        )?;

        let normalized = amount::format_units(amount_units, scale);
        let net = amount::format_units(net_units, scale);
        let note = format!(
            "fee {} {}, net payout {} {}",
            chain.withdrawal_fee, chain.native_currency, net, chain.native_currency
        );

        let tx = Transaction::new_withdrawal(
            user_id,
            chain.native_currency,
            &normalized,
            chain.id,
            destination,
            note,
        );
        let remaining = self.ledger.submit_withdrawal(&tx)?;

        tracing::info!(
            user_id = %user_id,
            tx_id = %tx.id,
            amount = %normalized,
            currency = chain.native_currency,
            network = chain.id,
            remaining = %remaining,
            "Withdrawal submitted for review"
        );
        Ok(tx)
    }

    /// Approves a pending withdrawal.
    ///
    /// With `manual_tx_hash` the record completes carrying that hash
    /// verbatim. Without one the net amount is broadcast from the hot
    /// wallet and the record completes with the broadcast hash.
    pub async fn approve(
        &self,
        tx_id: &str,
        note: Option<&str>,
        manual_tx_hash: Option<&str>,
    ) -> Result<Transaction, WithdrawError> {
        let tx = self
            .ledger
            .transaction(tx_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {tx_id}")))?;

        if tx.kind != TxKind::Withdraw || tx.status != TxStatus::Pending {
            return Err(LedgerError::NotPending(tx_id.to_string()).into());
        }

        let manual = manual_tx_hash.map(str::trim).filter(|h| !h.is_empty());
        if let Some(hash) = manual {
            let settled = self.ledger.settle_withdrawal(tx_id, hash, note)?;
            tracing::info!(
                tx_id = %tx_id,
                tx_hash = %hash,
                "Withdrawal approved with operator-supplied hash"
            );
            return Ok(settled);
        }

        let chain = config_for(&tx.network)
            .ok_or_else(|| WithdrawError::UnknownNetwork(tx.network.clone()))?;
        let client = ChainClient::connect(chain)?;
        self.broadcast_and_settle(&client, &tx, note).await
    }

    /// Broadcasts the net payout and settles the record with its hash.
    ///
    /// A broadcast error propagates before the ledger is touched, keeping
    /// the record pending and the debit in place.
    pub(crate) async fn broadcast_and_settle<C: ChainOps>(
        &self,
        chain: &C,
        tx: &Transaction,
        note: Option<&str>,
    ) -> Result<Transaction, WithdrawError> {
        let key_hex = self.hot_wallet_key.as_deref().ok_or(WithdrawError::NoHotWallet)?;
        let signer = HotWalletKey::from_hex(key_hex)?;
        let destination = tx
            .withdraw_address
            .as_deref()
            .ok_or_else(|| WithdrawError::InvalidDestination("missing destination".to_string()))?;

        let cfg = chain.config();
        let scale = amount::scale_for(&tx.currency);
        let amount_units = amount::parse_units(&tx.amount, scale)?;
        let fee_units = amount::parse_units(cfg.withdrawal_fee, scale)?;
        let net = amount::format_units(amount_units.saturating_sub(fee_units), scale);
        let net_wei = parse_amount(&net, NATIVE_DECIMALS)?;

        let fees = chain.fee_data().await?;
        let result = chain
            .send_native(signer.to_wallet(), destination, net_wei, &fees, None)
            .await?;

        let settled = self.ledger.settle_withdrawal(&tx.id, &result.tx_hash, note)?;
        tracing::info!(
            tx_id = %tx.id,
            tx_hash = %result.tx_hash,
            net_amount = %net,
            from = %signer.address(),
            "Withdrawal payout broadcast"
        );
        Ok(settled)
    }

    /// Rejects a pending withdrawal, returning the full amount.
    pub fn reject(&self, tx_id: &str, note: Option<&str>) -> Result<Transaction, WithdrawError> {
        let rejected = self.ledger.reject_withdrawal(tx_id, note)?;
        tracing::info!(
            tx_id = %tx_id,
            user_id = %rejected.user_id,
            amount = %rejected.amount,
            "Withdrawal rejected, funds returned"
        );
        Ok(rejected)
    }

    /// The operator review queue.
    pub fn pending(&self) -> Result<Vec<Transaction>, WithdrawError> {
        Ok(self
            .ledger
            .transactions_with_status(TxKind::Withdraw, TxStatus::Pending)?)
    }
}
