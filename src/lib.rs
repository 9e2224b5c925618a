// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! Custodia - Custodial Multi-Chain Wallet Service
//!
//! This crate provides a custodial wallet engine for EVM networks: deposit
//! address issuance with vault-sealed keys, confirmation-tracked deposit
//! crediting, operator-reviewed withdrawals, and treasury sweeps.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `blockchain` - Chain registry, JSON-RPC client, explorer polling, signing
//! - `ledger` - redb-backed balances, wallets, and transaction records
//! - `vault` - AES-256-GCM sealing of deposit keys
//! - `watcher` - Background deposit scanner
//! - `withdraw` - Withdrawal lifecycle (submit, approve, reject)
//! - `sweep` - Fund consolidation into a treasury address

pub mod api;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod ledger;
pub mod state;
pub mod sweep;
pub mod vault;
pub mod watcher;
pub mod withdraw;
