// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! Transaction history and user-facing withdrawal submission.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::ApiError,
    ledger::{LedgerError, Transaction, TxKind},
    state::AppState,
    withdraw::WithdrawError,
};

use super::internal;

/// Default page size for history queries.
const DEFAULT_HISTORY_LIMIT: usize = 50;
/// Hard cap on history page size.
const MAX_HISTORY_LIMIT: usize = 200;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query parameters for the transaction history.
#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Filter by direction: "deposit" or "withdraw". Absent means both.
    pub kind: Option<TxKind>,
    /// Maximum number of results (default 50, capped at 200).
    #[param(default = 50, maximum = 200)]
    pub limit: Option<usize>,
}

/// Request to withdraw funds to an external address.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WithdrawRequest {
    /// Currency code, e.g. "ETH". Must be the native asset of `network`.
    pub currency: String,
    /// Amount in ledger units, e.g. "0.25".
    pub amount: String,
    /// Network to pay out on, e.g. "ethereum".
    pub network: String,
    /// Destination address (0x + 40 hex chars).
    pub destination: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Maps withdrawal-domain errors onto HTTP statuses.
pub(crate) fn withdraw_error(err: WithdrawError) -> ApiError {
    match err {
        WithdrawError::UnknownNetwork(_) => ApiError::bad_request(err.to_string()),
        WithdrawError::CurrencyMismatch { .. }
        | WithdrawError::InvalidDestination(_)
        | WithdrawError::BelowMinimum { .. }
        | WithdrawError::FeeExceedsAmount { .. }
        | WithdrawError::Amount(_) => ApiError::unprocessable(err.to_string()),
        WithdrawError::NoHotWallet | WithdrawError::Chain(_) => {
            ApiError::service_unavailable(err.to_string())
        }
        WithdrawError::Ledger(LedgerError::NotFound(_)) => ApiError::not_found(err.to_string()),
        WithdrawError::Ledger(LedgerError::NotPending(_))
        | WithdrawError::Ledger(LedgerError::InsufficientFunds { .. }) => {
            ApiError::unprocessable(err.to_string())
        }
        WithdrawError::Ledger(_) => ApiError::internal(err.to_string()),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Transaction history for a user, newest first.
#[utoipa::path(
    get,
    path = "/v1/users/{user_id}/transactions",
    params(
        ("user_id" = String, Path, description = "User whose history to list"),
        HistoryQuery
    ),
    tag = "Transactions",
    responses((status = 200, body = [Transaction]))
)]
pub async fn list_transactions(
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    let transactions = state
        .ledger
        .list_for_user(&user_id, query.kind, limit)
        .map_err(internal)?;
    Ok(Json(transactions))
}

/// Submit a withdrawal request.
///
/// The full amount is debited immediately and the record enters the
/// operator review queue as `pending`.
#[utoipa::path(
    post,
    path = "/v1/users/{user_id}/withdrawals",
    params(
        ("user_id" = String, Path, description = "User requesting the withdrawal")
    ),
    request_body = WithdrawRequest,
    tag = "Transactions",
    responses(
        (status = 201, description = "Withdrawal submitted for review", body = Transaction),
        (status = 400, description = "Unknown network"),
        (status = 422, description = "Validation failed or insufficient funds")
    )
)]
pub async fn submit_withdrawal(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<WithdrawRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let tx = state
        .withdrawals
        .request(
            &user_id,
            &request.currency,
            &request.amount,
            &request.network,
            &request.destination,
        )
        .map_err(withdraw_error)?;
    Ok((StatusCode::CREATED, Json(tx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::test_state;
    use crate::ledger::TxStatus;

    const DEST: &str = "0x4444444444444444444444444444444444444444";

    fn withdraw_body(amount: &str, network: &str) -> WithdrawRequest {
        WithdrawRequest {
            currency: "ETH".to_string(),
            amount: amount.to_string(),
            network: network.to_string(),
            destination: DEST.to_string(),
        }
    }

    #[tokio::test]
    async fn submission_debits_and_returns_the_pending_record() {
        let (state, _dir) = test_state();
        state.ledger.credit("user-1", "ETH", "1").unwrap();

        let (status, Json(tx)) = submit_withdrawal(
            Path("user-1".to_string()),
            State(state.clone()),
            Json(withdraw_body("0.5", "ethereum")),
        )
        .await
        .expect("submission succeeds");

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(tx.status, TxStatus::Pending);
        assert_eq!(state.ledger.balance("user-1", "ETH").unwrap(), "0.5");
    }

    #[tokio::test]
    async fn submission_maps_domain_errors_to_statuses() {
        let (state, _dir) = test_state();
        state.ledger.credit("user-1", "ETH", "1").unwrap();

        let unknown = submit_withdrawal(
            Path("user-1".to_string()),
            State(state.clone()),
            Json(withdraw_body("0.5", "dogecoin")),
        )
        .await
        .unwrap_err();
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

        let below = submit_withdrawal(
            Path("user-1".to_string()),
            State(state.clone()),
            Json(withdraw_body("0.001", "ethereum")),
        )
        .await
        .unwrap_err();
        assert_eq!(below.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let short = submit_withdrawal(
            Path("user-1".to_string()),
            State(state.clone()),
            Json(withdraw_body("100", "ethereum")),
        )
        .await
        .unwrap_err();
        assert_eq!(short.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(state.ledger.balance("user-1", "ETH").unwrap(), "1");
    }

    #[tokio::test]
    async fn history_filters_by_kind_and_respects_the_limit() {
        let (state, _dir) = test_state();
        state.ledger.credit("user-1", "ETH", "10").unwrap();

        for _ in 0..3 {
            submit_withdrawal(
                Path("user-1".to_string()),
                State(state.clone()),
                Json(withdraw_body("0.5", "ethereum")),
            )
            .await
            .unwrap();
        }

        let Json(all) = list_transactions(
            Path("user-1".to_string()),
            Query(HistoryQuery {
                kind: None,
                limit: None,
            }),
            State(state.clone()),
        )
        .await
        .unwrap();
        assert_eq!(all.len(), 3);

        let Json(deposits) = list_transactions(
            Path("user-1".to_string()),
            Query(HistoryQuery {
                kind: Some(TxKind::Deposit),
                limit: None,
            }),
            State(state.clone()),
        )
        .await
        .unwrap();
        assert!(deposits.is_empty());

        let Json(capped) = list_transactions(
            Path("user-1".to_string()),
            Query(HistoryQuery {
                kind: Some(TxKind::Withdraw),
                limit: Some(2),
            }),
            State(state),
        )
        .await
        .unwrap();
        assert_eq!(capped.len(), 2);
    }
}
