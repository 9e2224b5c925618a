// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! Deposit wallet issuance and listing.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    blockchain::SUPPORTED_CHAINS, error::ApiError, ledger::DepositWallet, state::AppState,
    vault::generate_wallet,
};

use super::internal;

/// A deposit wallet as the API exposes it. Key material never leaves the
/// ledger.
#[derive(Debug, Serialize, ToSchema)]
pub struct WalletSummary {
    pub currency: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

impl From<&DepositWallet> for WalletSummary {
    fn from(wallet: &DepositWallet) -> Self {
        Self {
            currency: wallet.currency.clone(),
            address: wallet.address.clone(),
            created_at: wallet.created_at,
        }
    }
}

/// Issue a deposit wallet for every supported currency.
///
/// Idempotent. Currencies the user already holds a wallet for are returned
/// as-is; keys are never rotated here.
#[utoipa::path(
    post,
    path = "/v1/users/{user_id}/wallets",
    params(
        ("user_id" = String, Path, description = "User to issue deposit wallets for")
    ),
    tag = "Wallets",
    responses(
        (status = 200, body = [WalletSummary]),
        (status = 503, description = "Wallet encryption is not configured")
    )
)]
pub async fn issue_wallets(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<WalletSummary>>, ApiError> {
    if !state.vault.is_configured() {
        return Err(ApiError::service_unavailable(
            "wallet encryption is not configured",
        ));
    }

    let mut summaries = Vec::with_capacity(SUPPORTED_CHAINS.len());
    for chain in SUPPORTED_CHAINS {
        let currency = chain.native_currency;
        if let Some(existing) = state.ledger.wallet(&user_id, currency).map_err(internal)? {
            summaries.push(WalletSummary::from(&existing));
            continue;
        }

        let generated = generate_wallet();
        let encrypted = state
            .vault
            .encrypt(&generated.private_key_hex)
            .map_err(internal)?;
        let wallet = DepositWallet {
            user_id: user_id.clone(),
            currency: currency.to_string(),
            address: generated.address,
            encrypted_private_key: encrypted,
            created_at: Utc::now(),
        };
        state.ledger.insert_wallet(&wallet).map_err(internal)?;
        tracing::info!(
            user_id = %user_id,
            currency,
            address = %wallet.address,
            "Deposit wallet issued"
        );
        summaries.push(WalletSummary::from(&wallet));
    }

    Ok(Json(summaries))
}

/// List the user's deposit wallets.
#[utoipa::path(
    get,
    path = "/v1/users/{user_id}/wallets",
    params(
        ("user_id" = String, Path, description = "User whose wallets to list")
    ),
    tag = "Wallets",
    responses((status = 200, body = [WalletSummary]))
)]
pub async fn list_wallets(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<WalletSummary>>, ApiError> {
    let wallets = state.ledger.wallets_for_user(&user_id).map_err(internal)?;
    Ok(Json(wallets.iter().map(WalletSummary::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::test_state;

    #[tokio::test]
    async fn issuance_creates_one_wallet_per_currency_and_is_idempotent() {
        let (state, _dir) = test_state();

        let Json(first) = issue_wallets(Path("user-1".to_string()), State(state.clone()))
            .await
            .expect("issuance succeeds");

        assert_eq!(first.len(), SUPPORTED_CHAINS.len());
        let mut currencies: Vec<_> = first.iter().map(|w| w.currency.as_str()).collect();
        currencies.sort_unstable();
        assert_eq!(currencies, vec!["BNB", "ETH", "POL"]);
        for wallet in &first {
            assert!(wallet.address.starts_with("0x"));
            assert_eq!(wallet.address.len(), 42);
        }

        let Json(second) = issue_wallets(Path("user-1".to_string()), State(state.clone()))
            .await
            .expect("reissue succeeds");
        let addr = |list: &[WalletSummary], cur: &str| {
            list.iter().find(|w| w.currency == cur).unwrap().address.clone()
        };
        for cur in ["ETH", "BNB", "POL"] {
            assert_eq!(addr(&first, cur), addr(&second, cur));
        }
    }

    #[tokio::test]
    async fn issuance_requires_a_configured_vault() {
        let (state, _dir) = test_state();
        let mut bare = state.clone();
        bare.vault = std::sync::Arc::new(crate::vault::KeyVault::unconfigured());

        let err = issue_wallets(Path("user-1".to_string()), State(bare))
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn listing_is_scoped_to_the_user_and_hides_keys() {
        let (state, _dir) = test_state();
        issue_wallets(Path("user-1".to_string()), State(state.clone()))
            .await
            .unwrap();
        issue_wallets(Path("user-2".to_string()), State(state.clone()))
            .await
            .unwrap();

        let Json(mine) = list_wallets(Path("user-1".to_string()), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(mine.len(), SUPPORTED_CHAINS.len());

        let body = serde_json::to_value(&mine).unwrap();
        assert!(body[0].get("encrypted_private_key").is_none());

        let Json(none) = list_wallets(Path("user-3".to_string()), State(state))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
