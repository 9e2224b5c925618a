// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::blockchain::{NetworkSummary, SUPPORTED_CHAINS};
use crate::state::AppState;

/// Health check response with per-capability readiness flags.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall status; "ok" whenever the process is serving.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Capabilities that may be disabled by missing configuration.
    pub checks: HealthChecks,
    /// Networks the service watches and pays out on.
    pub networks: Vec<NetworkSummary>,
}

/// Capability flags. `false` means the capability is disabled, not that
/// the service is broken.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Deposit watcher running (explorer API key present at boot).
    pub deposit_watcher: bool,
    /// Wallet issuance and sweeps possible (encryption secret present).
    pub vault: bool,
    /// Automated withdrawal payouts possible (hot wallet key present).
    pub hot_wallet: bool,
}

/// Health check endpoint handler.
///
/// Always returns 200 while the process serves; degraded capabilities
/// surface as `false` flags so probes and dashboards can alert on them.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service is serving", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            deposit_watcher: state.watcher_enabled,
            vault: state.vault.is_configured(),
            hot_wallet: state.withdrawals.can_broadcast(),
        },
        networks: SUPPORTED_CHAINS.iter().map(NetworkSummary::from).collect(),
    })
}
