// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

use std::sync::Arc;

use crate::ledger::LedgerDb;
use crate::sweep::SweepOrchestrator;
use crate::vault::KeyVault;
use crate::withdraw::WithdrawalExecutor;

/// Shared handles every API handler can reach.
///
/// `LedgerDb` serializes writes internally, so the state is plain `Arc`
/// clones with no outer lock.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerDb>,
    pub vault: Arc<KeyVault>,
    pub withdrawals: Arc<WithdrawalExecutor>,
    pub sweeper: Arc<SweepOrchestrator>,
    /// Whether the deposit watcher was started at boot.
    pub watcher_enabled: bool,
}

impl AppState {
    pub fn new(
        ledger: Arc<LedgerDb>,
        vault: Arc<KeyVault>,
        withdrawals: WithdrawalExecutor,
        sweeper: SweepOrchestrator,
        watcher_enabled: bool,
    ) -> Self {
        Self {
            ledger,
            vault,
            withdrawals: Arc::new(withdrawals),
            sweeper: Arc::new(sweeper),
            watcher_enabled,
        }
    }
}
