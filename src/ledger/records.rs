// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! # Ledger Records
//!
//! The persisted record types: deposit wallets and the unified transaction
//! record covering both deposits and withdrawals, plus the observation and
//! outcome types the deposit watcher exchanges with the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Transaction direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Deposit,
    Withdraw,
}

/// Transaction lifecycle state.
///
/// Deposits move `confirming -> completed`. Withdrawals move
/// `pending -> completed` on approval or `pending -> rejected` on refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirming,
    Completed,
    Rejected,
}

/// A custodial deposit wallet: one per user per supported currency.
///
/// The private key is stored sealed by the vault and never appears in API
/// responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositWallet {
    pub user_id: String,
    /// Native currency code this wallet collects (uppercase).
    pub currency: String,
    /// Deposit address, `0x`-prefixed lowercase hex.
    pub address: String,
    /// Vault-sealed private key (`iv:tag:ciphertext` hex).
    pub encrypted_private_key: String,
    pub created_at: DateTime<Utc>,
}

/// A ledger transaction record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Record id (UUID).
    pub id: String,
    pub user_id: String,
    pub kind: TxKind,
    /// Currency code (uppercase).
    pub currency: String,
    /// Amount as a decimal string in ledger units.
    pub amount: String,
    /// Registry network id the transaction was observed or requested on.
    pub network: String,
    pub status: TxStatus,
    /// On-chain hash. Set at discovery for deposits, at settlement for
    /// withdrawals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Confirmations observed so far. Monotonically non-decreasing.
    pub confirmations: u64,
    /// Confirmations required before a deposit credits.
    pub required_confirmations: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,
    /// Destination the user asked a withdrawal to be paid to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdraw_address: Option<String>,
    /// Operator-facing note: the fee breakdown at submission, replaced by
    /// the operator's note on approve/reject when one is given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Builds a deposit record from a watcher observation.
    ///
    /// A deposit already at its required depth starts out `completed`;
    /// otherwise it starts `confirming`.
    pub fn new_deposit(obs: &DepositObservation) -> Self {
        let now = Utc::now();
        let status = if obs.confirmations >= obs.required_confirmations {
            TxStatus::Completed
        } else {
            TxStatus::Confirming
        };

        Self {
            id: Uuid::new_v4().to_string(),
            user_id: obs.user_id.clone(),
            kind: TxKind::Deposit,
            currency: obs.currency.to_uppercase(),
            amount: obs.amount.clone(),
            network: obs.network.clone(),
            status,
            tx_hash: Some(obs.tx_hash.clone()),
            confirmations: obs.confirmations,
            required_confirmations: obs.required_confirmations,
            from_address: Some(obs.from_address.clone()),
            to_address: Some(obs.to_address.clone()),
            withdraw_address: None,
            admin_note: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builds a pending withdrawal record.
    pub fn new_withdrawal(
        user_id: &str,
        currency: &str,
        amount: &str,
        network: &str,
        destination: &str,
        note: String,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind: TxKind::Withdraw,
            currency: currency.to_uppercase(),
            amount: amount.to_string(),
            network: network.to_string(),
            status: TxStatus::Pending,
            tx_hash: None,
            confirmations: 0,
            required_confirmations: 0,
            from_address: None,
            to_address: None,
            withdraw_address: Some(destination.to_string()),
            admin_note: Some(note),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One inbound transfer the watcher saw on chain, ready to be applied to
/// the ledger.
#[derive(Debug, Clone)]
pub struct DepositObservation {
    pub user_id: String,
    pub currency: String,
    pub network: String,
    pub tx_hash: String,
    pub from_address: String,
    pub to_address: String,
    /// Amount in ledger units (decimal string).
    pub amount: String,
    pub confirmations: u64,
    pub required_confirmations: u64,
}

/// What applying an observation did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositOutcome {
    /// New record created below threshold; no credit yet.
    Recorded,
    /// New record created already at threshold; balance credited.
    Credited,
    /// Existing confirming record crossed the threshold; balance credited.
    Promoted,
    /// Existing confirming record's count advanced; still below threshold.
    Updated,
    /// Nothing to do: record is terminal or the observation adds nothing.
    Unchanged,
}
