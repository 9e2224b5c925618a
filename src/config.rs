// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! # Runtime Configuration Constants
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the ledger database | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `WALLET_ENC_SECRET` | Secret deriving the deposit-key encryption key | Required for wallet issuance |
//! | `HOT_WALLET_KEY` | Hex private key funding withdrawal payouts | Required for automated payouts |
//! | `EXPLORER_API_KEY` | Etherscan-family API key for deposit scans | Required for the deposit watcher |
//! | `DEPOSIT_POLL_SECS` | Seconds between deposit scan passes | `60` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable name for the ledger data directory path.
///
/// [`crate::ledger::LedgerDb`] creates the directory on startup if it does
/// not exist and places `ledger.redb` inside it.
///
/// # Default
/// `/data`
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the wallet encryption secret.
///
/// The AES-256-GCM key protecting stored deposit keys is derived from this
/// value. Without it the vault is unconfigured and wallet issuance and
/// sweeps refuse to run.
pub const WALLET_ENC_SECRET_ENV: &str = "WALLET_ENC_SECRET";

/// Environment variable name for the hot wallet private key.
///
/// Withdrawal payouts are signed with this key. Without it approvals must
/// supply an externally settled transaction hash.
pub const HOT_WALLET_KEY_ENV: &str = "HOT_WALLET_KEY";

/// Environment variable name for the block explorer API key.
///
/// One key is shared across the Etherscan-family endpoints of all
/// supported networks. Without it the deposit watcher stays disabled.
pub const EXPLORER_API_KEY_ENV: &str = "EXPLORER_API_KEY";

/// Environment variable name for the deposit poll interval, in seconds.
pub const DEPOSIT_POLL_SECS_ENV: &str = "DEPOSIT_POLL_SECS";

/// Resolves the ledger data directory from the environment.
pub fn data_dir() -> PathBuf {
    std::env::var(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/data"))
}

/// Reads the hot wallet key, treating a blank value as absent.
pub fn hot_wallet_key() -> Option<String> {
    std::env::var(HOT_WALLET_KEY_ENV)
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

/// Resolves the deposit poll interval from the environment.
pub fn deposit_poll_interval() -> Duration {
    poll_interval_from(std::env::var(DEPOSIT_POLL_SECS_ENV).ok())
}

/// Parses a poll interval, falling back to the default on absent, zero, or
/// unparseable values.
fn poll_interval_from(raw: Option<String>) -> Duration {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(crate::watcher::DEFAULT_POLL_INTERVAL)
}
