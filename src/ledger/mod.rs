// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! Embedded custody ledger backed by redb (pure Rust, ACID).
//!
//! Every money-moving operation (deposit crediting, withdrawal submission,
//! settlement, rejection) runs read-modify-write inside a single write
//! transaction, so balances cannot lose updates and a transaction hash can
//! credit at most once no matter how often the watcher re-observes it.
//!
//! ## Table Layout
//!
//! - `wallets`: `user|CURRENCY` → serialized DepositWallet
//! - `wallet_addresses`: lowercase deposit address → `user|CURRENCY`
//! - `balances`: `user|CURRENCY` → decimal string
//! - `transactions`: record id → serialized Transaction
//! - `tx_hashes`: lowercase on-chain hash → record id (dedup index)
//! - `user_tx_index`: composite key (user|!timestamp|id) → record id

pub mod amount;
pub mod records;

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use amount::AmountError;
pub use records::{
    DepositObservation, DepositOutcome, DepositWallet, Transaction, TxKind, TxStatus,
};

// =============================================================================
// Table Definitions
// =============================================================================

/// Deposit wallets: `user|CURRENCY` → serialized DepositWallet (JSON bytes).
const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");

/// Address attribution: lowercase address → `user|CURRENCY`.
const WALLET_ADDRESSES: TableDefinition<&str, &str> = TableDefinition::new("wallet_addresses");

/// Balances: `user|CURRENCY` → decimal string in ledger units.
const BALANCES: TableDefinition<&str, &str> = TableDefinition::new("balances");

/// Primary records table: record id → serialized Transaction (JSON bytes).
const TRANSACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("transactions");

/// Dedup index: lowercase on-chain hash → record id.
const TX_HASHES: TableDefinition<&str, &str> = TableDefinition::new("tx_hashes");

/// History index: composite key (`user|!timestamp_be|id`) → record id.
/// The inverted timestamp yields newest-first ordering on forward scans.
const USER_TX_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("user_tx_index");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("amount error: {0}")]
    Amount(#[from] AmountError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transaction {0} is not pending")]
    NotPending(String),

    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: String, requested: String },
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Key Helpers
// =============================================================================

/// Balance and wallet key for one user/currency pair.
fn account_key(user_id: &str, currency: &str) -> String {
    format!("{}|{}", user_id, currency.to_uppercase())
}

/// Build a composite key for the user_tx_index table.
///
/// Format: `user_id | inverted_timestamp_be_bytes | record_id`
fn make_index_key(user_id: &str, timestamp_micros: i64, tx_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_id.len() + 1 + 8 + 1 + tx_id.len());
    key.extend_from_slice(user_id.as_bytes());
    key.push(b'|');
    // Invert timestamp for descending order (newest first)
    key.extend_from_slice(&(!(timestamp_micros as u64)).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(tx_id.as_bytes());
    key
}

/// Lower bound for a range scan over one user's index entries.
fn index_prefix(user_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(user_id.len() + 1);
    prefix.extend_from_slice(user_id.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Exclusive upper bound: the separator bumped by one covers every
/// possible timestamp/id suffix.
fn index_prefix_end(user_id: &str) -> Vec<u8> {
    let mut end = Vec::with_capacity(user_id.len() + 1);
    end.extend_from_slice(user_id.as_bytes());
    end.push(b'|' + 1);
    end
}

// =============================================================================
// In-Transaction Helpers
// =============================================================================

type StrTable<'txn> = redb::Table<'txn, &'static str, &'static str>;
type BytesTable<'txn> = redb::Table<'txn, &'static str, &'static [u8]>;

fn read_balance(table: &StrTable<'_>, key: &str) -> LedgerResult<String> {
    let guard = table.get(key)?;
    Ok(guard
        .map(|v| v.value().to_string())
        .unwrap_or_else(|| "0".to_string()))
}

fn credit_in(
    table: &mut StrTable<'_>,
    key: &str,
    amount_str: &str,
    scale: u32,
) -> LedgerResult<String> {
    let current = read_balance(table, key)?;
    let sum = amount::parse_units(&current, scale)?
        .checked_add(amount::parse_units(amount_str, scale)?)
        .ok_or(AmountError::Overflow)?;
    let updated = amount::format_units(sum, scale);
    table.insert(key, updated.as_str())?;
    Ok(updated)
}

fn debit_in(
    table: &mut StrTable<'_>,
    key: &str,
    amount_str: &str,
    scale: u32,
) -> LedgerResult<String> {
    let current = read_balance(table, key)?;
    let have = amount::parse_units(&current, scale)?;
    let want = amount::parse_units(amount_str, scale)?;
    if want > have {
        return Err(LedgerError::InsufficientFunds {
            balance: current,
            requested: amount_str.to_string(),
        });
    }
    let updated = amount::format_units(have - want, scale);
    table.insert(key, updated.as_str())?;
    Ok(updated)
}

fn load_transaction(table: &BytesTable<'_>, tx_id: &str) -> LedgerResult<Transaction> {
    let bytes = table
        .get(tx_id)?
        .ok_or_else(|| LedgerError::NotFound(format!("transaction {tx_id}")))?
        .value()
        .to_vec();
    Ok(serde_json::from_slice(&bytes)?)
}

/// Replaces the stored note when the operator supplied a non-blank one.
fn apply_note(tx: &mut Transaction, note: Option<&str>) {
    if let Some(note) = note {
        let trimmed = note.trim();
        if !trimmed.is_empty() {
            tx.admin_note = Some(trimmed.to_string());
        }
    }
}

// =============================================================================
// LedgerDb
// =============================================================================

/// Embedded ACID custody ledger.
pub struct LedgerDb {
    db: Database,
}

impl LedgerDb {
    /// Open (or create) the ledger inside `data_dir`.
    pub fn open(data_dir: &Path) -> LedgerResult<Self> {
        std::fs::create_dir_all(data_dir).ok();
        let db = Database::create(data_dir.join("ledger.redb"))?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(WALLET_ADDRESSES)?;
            let _ = write_txn.open_table(BALANCES)?;
            let _ = write_txn.open_table(TRANSACTIONS)?;
            let _ = write_txn.open_table(TX_HASHES)?;
            let _ = write_txn.open_table(USER_TX_INDEX)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Deposit Wallets
    // =========================================================================

    /// Stores a wallet and registers its address for deposit attribution.
    pub fn insert_wallet(&self, wallet: &DepositWallet) -> LedgerResult<()> {
        let json = serde_json::to_vec(wallet)?;
        let key = account_key(&wallet.user_id, &wallet.currency);
        let addr_key = wallet.address.to_lowercase();

        let write_txn = self.db.begin_write()?;
        {
            let mut wallets = write_txn.open_table(WALLETS)?;
            wallets.insert(key.as_str(), json.as_slice())?;

            let mut addresses = write_txn.open_table(WALLET_ADDRESSES)?;
            addresses.insert(addr_key.as_str(), key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// The wallet for one user/currency pair, if issued.
    pub fn wallet(&self, user_id: &str, currency: &str) -> LedgerResult<Option<DepositWallet>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        match table.get(account_key(user_id, currency).as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All wallets issued to one user.
    pub fn wallets_for_user(&self, user_id: &str) -> LedgerResult<Vec<DepositWallet>> {
        let prefix = format!("{user_id}|");
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;

        let mut wallets = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            if key.value().starts_with(&prefix) {
                wallets.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(wallets)
    }

    /// Every issued wallet. The watcher scans these each tick.
    pub fn all_wallets(&self) -> LedgerResult<Vec<DepositWallet>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;

        let mut wallets = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            wallets.push(serde_json::from_slice(value.value())?);
        }
        Ok(wallets)
    }

    /// Attribution lookup: which wallet owns a deposit address.
    pub fn wallet_for_address(&self, address: &str) -> LedgerResult<Option<DepositWallet>> {
        let read_txn = self.db.begin_read()?;
        let addresses = read_txn.open_table(WALLET_ADDRESSES)?;

        let account = {
            let guard = addresses.get(address.to_lowercase().as_str())?;
            match guard {
                Some(v) => v.value().to_string(),
                None => return Ok(None),
            }
        };

        let wallets = read_txn.open_table(WALLETS)?;
        match wallets.get(account.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Balances
    // =========================================================================

    /// Current balance, `"0"` if the account has never been touched.
    pub fn balance(&self, user_id: &str, currency: &str) -> LedgerResult<String> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BALANCES)?;
        let guard = table.get(account_key(user_id, currency).as_str())?;
        Ok(guard
            .map(|v| v.value().to_string())
            .unwrap_or_else(|| "0".to_string()))
    }

    /// Adds to a balance. Returns the updated balance.
    pub fn credit(&self, user_id: &str, currency: &str, amount_str: &str) -> LedgerResult<String> {
        let key = account_key(user_id, currency);
        let scale = amount::scale_for(currency);

        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut balances = write_txn.open_table(BALANCES)?;
            credit_in(&mut balances, &key, amount_str, scale)?
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// Subtracts from a balance, failing without change when funds are
    /// short. Returns the updated balance.
    pub fn debit(&self, user_id: &str, currency: &str, amount_str: &str) -> LedgerResult<String> {
        let key = account_key(user_id, currency);
        let scale = amount::scale_for(currency);

        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut balances = write_txn.open_table(BALANCES)?;
            debit_in(&mut balances, &key, amount_str, scale)?
        };
        write_txn.commit()?;
        Ok(updated)
    }

    // =========================================================================
    // Transaction Reads
    // =========================================================================

    /// Look up a single record by id.
    pub fn transaction(&self, tx_id: &str) -> LedgerResult<Option<Transaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;
        match table.get(tx_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up a record by its on-chain hash.
    pub fn transaction_by_hash(&self, tx_hash: &str) -> LedgerResult<Option<Transaction>> {
        let read_txn = self.db.begin_read()?;
        let hashes = read_txn.open_table(TX_HASHES)?;

        let tx_id = {
            let guard = hashes.get(tx_hash.to_lowercase().as_str())?;
            match guard {
                Some(v) => v.value().to_string(),
                None => return Ok(None),
            }
        };

        let table = read_txn.open_table(TRANSACTIONS)?;
        match table.get(tx_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// One user's history, newest first, optionally filtered by direction.
    pub fn list_for_user(
        &self,
        user_id: &str,
        kind: Option<TxKind>,
        limit: usize,
    ) -> LedgerResult<Vec<Transaction>> {
        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(USER_TX_INDEX)?;
        let tx_table = read_txn.open_table(TRANSACTIONS)?;

        let prefix = index_prefix(user_id);
        let prefix_end = index_prefix_end(user_id);

        let mut results = Vec::new();
        for entry in idx_table.range(prefix.as_slice()..prefix_end.as_slice())? {
            let (_, value) = entry?;
            let tx_id = value.value().to_string();

            let Some(bytes) = tx_table.get(tx_id.as_str())? else {
                continue;
            };
            let tx: Transaction = serde_json::from_slice(bytes.value())?;

            if let Some(wanted) = kind {
                if tx.kind != wanted {
                    continue;
                }
            }

            results.push(tx);
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    /// Every record in one direction and state, e.g. pending withdrawals
    /// for the operator queue or confirming deposits for the watcher.
    pub fn transactions_with_status(
        &self,
        kind: TxKind,
        status: TxStatus,
    ) -> LedgerResult<Vec<Transaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;

        let mut results = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let tx: Transaction = serde_json::from_slice(value.value())?;
            if tx.kind == kind && tx.status == status {
                results.push(tx);
            }
        }
        Ok(results)
    }

    // =========================================================================
    // Deposit Application
    // =========================================================================

    /// Applies one watcher observation, treating the on-chain hash as the
    /// natural dedup key.
    ///
    /// A hash never seen creates a record (credited immediately when
    /// already at depth). A hash in `confirming` state advances its count,
    /// never backwards, and credits exactly once when the threshold is
    /// crossed. Any other existing record leaves the ledger untouched.
    pub fn apply_deposit(&self, obs: &DepositObservation) -> LedgerResult<DepositOutcome> {
        let hash_key = obs.tx_hash.to_lowercase();

        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut tx_table = write_txn.open_table(TRANSACTIONS)?;
            let mut hash_table = write_txn.open_table(TX_HASHES)?;
            let mut balances = write_txn.open_table(BALANCES)?;
            let mut idx_table = write_txn.open_table(USER_TX_INDEX)?;

            let existing_id = {
                let guard = hash_table.get(hash_key.as_str())?;
                guard.map(|v| v.value().to_string())
            };

            match existing_id {
                Some(tx_id) => {
                    let mut tx = load_transaction(&tx_table, &tx_id)?;

                    if tx.kind != TxKind::Deposit || tx.status != TxStatus::Confirming {
                        DepositOutcome::Unchanged
                    } else {
                        // Confirmation counts never move backwards.
                        let observed = tx.confirmations.max(obs.confirmations);
                        if observed >= tx.required_confirmations {
                            tx.confirmations = observed;
                            tx.status = TxStatus::Completed;
                            tx.updated_at = Utc::now();
                            credit_in(
                                &mut balances,
                                &account_key(&tx.user_id, &tx.currency),
                                &tx.amount,
                                amount::scale_for(&tx.currency),
                            )?;
                            let json = serde_json::to_vec(&tx)?;
                            tx_table.insert(tx_id.as_str(), json.as_slice())?;
                            DepositOutcome::Promoted
                        } else if observed > tx.confirmations {
                            tx.confirmations = observed;
                            tx.updated_at = Utc::now();
                            let json = serde_json::to_vec(&tx)?;
                            tx_table.insert(tx_id.as_str(), json.as_slice())?;
                            DepositOutcome::Updated
                        } else {
                            DepositOutcome::Unchanged
                        }
                    }
                }
                None => {
                    let tx = Transaction::new_deposit(obs);
                    let credited = tx.status == TxStatus::Completed;

                    if credited {
                        credit_in(
                            &mut balances,
                            &account_key(&tx.user_id, &tx.currency),
                            &tx.amount,
                            amount::scale_for(&tx.currency),
                        )?;
                    }

                    let json = serde_json::to_vec(&tx)?;
                    tx_table.insert(tx.id.as_str(), json.as_slice())?;
                    hash_table.insert(hash_key.as_str(), tx.id.as_str())?;
                    let idx_key =
                        make_index_key(&tx.user_id, tx.created_at.timestamp_micros(), &tx.id);
                    idx_table.insert(idx_key.as_slice(), tx.id.as_str())?;

                    if credited {
                        DepositOutcome::Credited
                    } else {
                        DepositOutcome::Recorded
                    }
                }
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    // =========================================================================
    // Withdrawal Lifecycle
    // =========================================================================

    /// Records a pending withdrawal and debits its full amount, atomically.
    ///
    /// When the balance is short the error aborts the transaction and no
    /// record is written. Returns the remaining balance.
    pub fn submit_withdrawal(&self, tx: &Transaction) -> LedgerResult<String> {
        let scale = amount::scale_for(&tx.currency);
        let key = account_key(&tx.user_id, &tx.currency);
        let json = serde_json::to_vec(tx)?;

        let write_txn = self.db.begin_write()?;
        let remaining = {
            let mut balances = write_txn.open_table(BALANCES)?;
            let remaining = debit_in(&mut balances, &key, &tx.amount, scale)?;

            let mut tx_table = write_txn.open_table(TRANSACTIONS)?;
            tx_table.insert(tx.id.as_str(), json.as_slice())?;

            let mut idx_table = write_txn.open_table(USER_TX_INDEX)?;
            let idx_key = make_index_key(&tx.user_id, tx.created_at.timestamp_micros(), &tx.id);
            idx_table.insert(idx_key.as_slice(), tx.id.as_str())?;

            remaining
        };
        write_txn.commit()?;
        Ok(remaining)
    }

    /// Marks a pending withdrawal completed with its on-chain hash.
    ///
    /// The hash joins the dedup index so the same transfer can never also
    /// be credited as a deposit.
    pub fn settle_withdrawal(
        &self,
        tx_id: &str,
        tx_hash: &str,
        note: Option<&str>,
    ) -> LedgerResult<Transaction> {
        let write_txn = self.db.begin_write()?;
        let settled = {
            let mut tx_table = write_txn.open_table(TRANSACTIONS)?;
            let mut tx = load_transaction(&tx_table, tx_id)?;

            if tx.kind != TxKind::Withdraw || tx.status != TxStatus::Pending {
                return Err(LedgerError::NotPending(tx_id.to_string()));
            }

            tx.status = TxStatus::Completed;
            tx.tx_hash = Some(tx_hash.to_string());
            apply_note(&mut tx, note);
            tx.updated_at = Utc::now();

            let json = serde_json::to_vec(&tx)?;
            tx_table.insert(tx_id, json.as_slice())?;

            let mut hash_table = write_txn.open_table(TX_HASHES)?;
            let hash_key = tx_hash.to_lowercase();
            hash_table.insert(hash_key.as_str(), tx_id)?;

            tx
        };
        write_txn.commit()?;
        Ok(settled)
    }

    /// Rejects a pending withdrawal and returns its full amount to the
    /// user's balance, atomically.
    pub fn reject_withdrawal(&self, tx_id: &str, note: Option<&str>) -> LedgerResult<Transaction> {
        let write_txn = self.db.begin_write()?;
        let rejected = {
            let mut tx_table = write_txn.open_table(TRANSACTIONS)?;
            let mut tx = load_transaction(&tx_table, tx_id)?;

            if tx.kind != TxKind::Withdraw || tx.status != TxStatus::Pending {
                return Err(LedgerError::NotPending(tx_id.to_string()));
            }

            tx.status = TxStatus::Rejected;
            apply_note(&mut tx, note);
            tx.updated_at = Utc::now();

            let json = serde_json::to_vec(&tx)?;
            tx_table.insert(tx_id, json.as_slice())?;

            let mut balances = write_txn.open_table(BALANCES)?;
            credit_in(
                &mut balances,
                &account_key(&tx.user_id, &tx.currency),
                &tx.amount,
                amount::scale_for(&tx.currency),
            )?;

            tx
        };
        write_txn.commit()?;
        Ok(rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_ledger() -> (LedgerDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDb::open(dir.path()).unwrap();
        (db, dir)
    }

    fn sample_wallet(user_id: &str, currency: &str, address: &str) -> DepositWallet {
        DepositWallet {
            user_id: user_id.to_string(),
            currency: currency.to_string(),
            address: address.to_string(),
            encrypted_private_key: "aa:bb:cc".to_string(),
            created_at: Utc::now(),
        }
    }

    fn observation(tx_hash: &str, confirmations: u64, required: u64) -> DepositObservation {
        DepositObservation {
            user_id: "user-1".to_string(),
            currency: "ETH".to_string(),
            network: "ethereum".to_string(),
            tx_hash: tx_hash.to_string(),
            from_address: "0x1111111111111111111111111111111111111111".to_string(),
            to_address: "0x2222222222222222222222222222222222222222".to_string(),
            amount: "1.5".to_string(),
            confirmations,
            required_confirmations: required,
        }
    }

    fn withdrawal(user_id: &str, amount: &str) -> Transaction {
        Transaction::new_withdrawal(
            user_id,
            "ETH",
            amount,
            "ethereum",
            "0x3333333333333333333333333333333333333333",
            "fee 0.0005 ETH, net payout 0.4995 ETH".to_string(),
        )
    }

    #[test]
    fn wallet_round_trip_and_address_attribution() {
        let (db, _dir) = temp_ledger();
        let wallet = sample_wallet("user-1", "ETH", "0xAbCd00000000000000000000000000000000Ef12");
        db.insert_wallet(&wallet).unwrap();

        let loaded = db.wallet("user-1", "eth").unwrap().unwrap();
        assert_eq!(loaded.address, wallet.address);

        // Attribution is case-insensitive
        let by_addr = db
            .wallet_for_address("0xABCD00000000000000000000000000000000EF12")
            .unwrap()
            .unwrap();
        assert_eq!(by_addr.user_id, "user-1");

        assert!(db.wallet_for_address("0xdead").unwrap().is_none());
    }

    #[test]
    fn wallet_listing_is_scoped_to_the_user() {
        let (db, _dir) = temp_ledger();
        db.insert_wallet(&sample_wallet("user-1", "ETH", "0xaa01")).unwrap();
        db.insert_wallet(&sample_wallet("user-1", "BNB", "0xaa02")).unwrap();
        db.insert_wallet(&sample_wallet("user-2", "ETH", "0xbb01")).unwrap();

        assert_eq!(db.wallets_for_user("user-1").unwrap().len(), 2);
        assert_eq!(db.wallets_for_user("user-2").unwrap().len(), 1);
        assert_eq!(db.all_wallets().unwrap().len(), 3);
    }

    #[test]
    fn balances_start_at_zero_and_accumulate() {
        let (db, _dir) = temp_ledger();
        assert_eq!(db.balance("user-1", "ETH").unwrap(), "0");

        assert_eq!(db.credit("user-1", "ETH", "1.5").unwrap(), "1.5");
        assert_eq!(db.credit("user-1", "ETH", "0.25").unwrap(), "1.75");
        assert_eq!(db.debit("user-1", "ETH", "0.75").unwrap(), "1");
        assert_eq!(db.balance("user-1", "ETH").unwrap(), "1");
    }

    #[test]
    fn debit_rejects_insufficient_funds_without_change() {
        let (db, _dir) = temp_ledger();
        db.credit("user-1", "ETH", "1").unwrap();

        let err = db.debit("user-1", "ETH", "2").unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(db.balance("user-1", "ETH").unwrap(), "1");
    }

    #[test]
    fn fiat_balances_use_two_decimals() {
        let (db, _dir) = temp_ledger();
        db.credit("user-1", "INR", "10.25").unwrap();
        assert_eq!(db.credit("user-1", "INR", "0.75").unwrap(), "11");

        let err = db.credit("user-1", "INR", "0.001").unwrap_err();
        assert!(matches!(err, LedgerError::Amount(_)));
    }

    #[test]
    fn shallow_deposit_is_recorded_without_credit() {
        let (db, _dir) = temp_ledger();
        let outcome = db.apply_deposit(&observation("0xAAA", 3, 12)).unwrap();
        assert_eq!(outcome, DepositOutcome::Recorded);
        assert_eq!(db.balance("user-1", "ETH").unwrap(), "0");

        let tx = db.transaction_by_hash("0xaaa").unwrap().unwrap();
        assert_eq!(tx.status, TxStatus::Confirming);
        assert_eq!(tx.confirmations, 3);
    }

    #[test]
    fn reobservation_advances_the_count_monotonically() {
        let (db, _dir) = temp_ledger();
        db.apply_deposit(&observation("0xaaa", 3, 12)).unwrap();

        let up = db.apply_deposit(&observation("0xaaa", 7, 12)).unwrap();
        assert_eq!(up, DepositOutcome::Updated);

        // A stale, lower observation changes nothing
        let down = db.apply_deposit(&observation("0xaaa", 4, 12)).unwrap();
        assert_eq!(down, DepositOutcome::Unchanged);

        let tx = db.transaction_by_hash("0xaaa").unwrap().unwrap();
        assert_eq!(tx.confirmations, 7);
        assert_eq!(tx.status, TxStatus::Confirming);
    }

    #[test]
    fn crossing_the_threshold_credits_exactly_once() {
        let (db, _dir) = temp_ledger();
        db.apply_deposit(&observation("0xaaa", 3, 12)).unwrap();
        assert_eq!(db.balance("user-1", "ETH").unwrap(), "0");

        let promoted = db.apply_deposit(&observation("0xaaa", 12, 12)).unwrap();
        assert_eq!(promoted, DepositOutcome::Promoted);
        assert_eq!(db.balance("user-1", "ETH").unwrap(), "1.5");

        // Deeper re-observations of a completed deposit never re-credit
        let again = db.apply_deposit(&observation("0xaaa", 20, 12)).unwrap();
        assert_eq!(again, DepositOutcome::Unchanged);
        assert_eq!(db.balance("user-1", "ETH").unwrap(), "1.5");
    }

    #[test]
    fn deep_first_observation_credits_immediately() {
        let (db, _dir) = temp_ledger();
        let outcome = db.apply_deposit(&observation("0xbbb", 40, 12)).unwrap();
        assert_eq!(outcome, DepositOutcome::Credited);
        assert_eq!(db.balance("user-1", "ETH").unwrap(), "1.5");

        let replay = db.apply_deposit(&observation("0xBBB", 41, 12)).unwrap();
        assert_eq!(replay, DepositOutcome::Unchanged);
        assert_eq!(db.balance("user-1", "ETH").unwrap(), "1.5");
    }

    #[test]
    fn submit_withdrawal_debits_and_records_atomically() {
        let (db, _dir) = temp_ledger();
        db.credit("user-1", "ETH", "2").unwrap();

        let tx = withdrawal("user-1", "0.5");
        let remaining = db.submit_withdrawal(&tx).unwrap();
        assert_eq!(remaining, "1.5");

        let pending = db
            .transactions_with_status(TxKind::Withdraw, TxStatus::Pending)
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, tx.id);
    }

    #[test]
    fn failed_submission_writes_nothing() {
        let (db, _dir) = temp_ledger();
        db.credit("user-1", "ETH", "0.1").unwrap();

        let tx = withdrawal("user-1", "5");
        let err = db.submit_withdrawal(&tx).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        assert_eq!(db.balance("user-1", "ETH").unwrap(), "0.1");
        assert!(db.transaction(&tx.id).unwrap().is_none());
        assert!(db.list_for_user("user-1", None, 10).unwrap().is_empty());
    }

    #[test]
    fn settlement_completes_with_hash_and_blocks_redeposit() {
        let (db, _dir) = temp_ledger();
        db.credit("user-1", "ETH", "2").unwrap();
        let tx = withdrawal("user-1", "0.5");
        db.submit_withdrawal(&tx).unwrap();

        let settled = db
            .settle_withdrawal(&tx.id, "0xPayout", Some("ok"))
            .unwrap();
        assert_eq!(settled.status, TxStatus::Completed);
        assert_eq!(settled.tx_hash.as_deref(), Some("0xPayout"));
        assert_eq!(settled.admin_note.as_deref(), Some("ok"));

        // Settling twice is refused
        let err = db.settle_withdrawal(&tx.id, "0xOther", None).unwrap_err();
        assert!(matches!(err, LedgerError::NotPending(_)));

        // The payout hash now occupies the dedup index
        let mut obs = observation("0xpayout", 40, 12);
        obs.amount = "0.4995".to_string();
        assert_eq!(db.apply_deposit(&obs).unwrap(), DepositOutcome::Unchanged);
        assert_eq!(db.balance("user-1", "ETH").unwrap(), "1.5");
    }

    #[test]
    fn rejection_restores_the_exact_amount() {
        let (db, _dir) = temp_ledger();
        db.credit("user-1", "ETH", "2").unwrap();
        let tx = withdrawal("user-1", "0.5");
        db.submit_withdrawal(&tx).unwrap();
        assert_eq!(db.balance("user-1", "ETH").unwrap(), "1.5");

        let rejected = db.reject_withdrawal(&tx.id, Some("bad address")).unwrap();
        assert_eq!(rejected.status, TxStatus::Rejected);
        assert_eq!(rejected.admin_note.as_deref(), Some("bad address"));
        assert_eq!(db.balance("user-1", "ETH").unwrap(), "2");

        let err = db.reject_withdrawal(&tx.id, None).unwrap_err();
        assert!(matches!(err, LedgerError::NotPending(_)));
        assert_eq!(db.balance("user-1", "ETH").unwrap(), "2");
    }

    #[test]
    fn blank_operator_note_keeps_the_fee_note() {
        let (db, _dir) = temp_ledger();
        db.credit("user-1", "ETH", "2").unwrap();
        let tx = withdrawal("user-1", "0.5");
        db.submit_withdrawal(&tx).unwrap();

        let settled = db.settle_withdrawal(&tx.id, "0xabc", Some("  ")).unwrap();
        assert_eq!(
            settled.admin_note.as_deref(),
            Some("fee 0.0005 ETH, net payout 0.4995 ETH")
        );
    }

    #[test]
    fn history_is_newest_first_with_kind_filter() {
        let (db, _dir) = temp_ledger();
        db.credit("user-1", "ETH", "5").unwrap();

        db.apply_deposit(&observation("0xaaa", 40, 12)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let w = withdrawal("user-1", "0.5");
        db.submit_withdrawal(&w).unwrap();

        let all = db.list_for_user("user-1", None, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].kind, TxKind::Withdraw);
        assert_eq!(all[1].kind, TxKind::Deposit);

        let deposits = db
            .list_for_user("user-1", Some(TxKind::Deposit), 10)
            .unwrap();
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].tx_hash.as_deref(), Some("0xaaa"));

        let limited = db.list_for_user("user-1", None, 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].kind, TxKind::Withdraw);

        assert!(db.list_for_user("user-2", None, 10).unwrap().is_empty());
    }
}
