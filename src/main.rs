// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! Service entry point: tracing, state wiring, the deposit watcher, and the
//! HTTP server with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use custodia::{
    api::router, blockchain::ExplorerClient, config, ledger::LedgerDb, state::AppState,
    sweep::SweepOrchestrator, vault::KeyVault, watcher::DepositWatcher,
    withdraw::WithdrawalExecutor,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Resolves on SIGINT or SIGTERM and cancels the shared token.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let data_dir = config::data_dir();
    let ledger = Arc::new(LedgerDb::open(&data_dir).expect("Failed to open ledger database"));
    tracing::info!(data_dir = %data_dir.display(), "Ledger opened");

    let vault = Arc::new(KeyVault::from_env());
    if !vault.is_configured() {
        tracing::warn!("WALLET_ENC_SECRET is not set; wallet issuance and sweeps are disabled");
    }

    let withdrawals = WithdrawalExecutor::from_env(ledger.clone());
    if !withdrawals.can_broadcast() {
        tracing::warn!("HOT_WALLET_KEY is not set; approvals must supply an external tx hash");
    }

    let sweeper = SweepOrchestrator::new(ledger.clone(), vault.clone());

    let shutdown = CancellationToken::new();
    let watcher_enabled = match ExplorerClient::from_env() {
        Ok(explorer) => {
            let watcher = DepositWatcher::new(
                ledger.clone(),
                explorer,
                config::deposit_poll_interval(),
            );
            tokio::spawn(watcher.run(shutdown.clone()));
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "Deposit watcher disabled");
            false
        }
    };

    let state = AppState::new(ledger, vault, withdrawals, sweeper, watcher_enabled);
    let app = router(state);

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("Failed to parse bind address");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");
    tracing::info!(%addr, "Custodia listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("Server failed");
}
