// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! Operator endpoints for withdrawal review and fund consolidation.
//!
//! These routes carry no authentication of their own; the deployment is
//! expected to front them with the gateway that authenticates operators.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::ApiError,
    ledger::Transaction,
    state::AppState,
    sweep::{SweepError, SweepReport},
};

use super::{internal, transactions::withdraw_error};

// ============================================================================
// Request Types
// ============================================================================

/// Operator decision on a pending withdrawal.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ApproveRequest {
    /// Note stored on the record; replaces the fee breakdown when given.
    pub note: Option<String>,
    /// Hash of an externally settled payout. When present the record is
    /// completed with this hash verbatim and nothing is broadcast.
    pub tx_hash: Option<String>,
}

/// Operator rejection of a pending withdrawal.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RejectRequest {
    /// Reason stored on the record.
    pub note: Option<String>,
}

/// Request to sweep all deposit addresses.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SweepRequest {
    /// Treasury address receiving the consolidated funds.
    pub destination: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Withdrawals awaiting operator review.
#[utoipa::path(
    get,
    path = "/v1/admin/withdrawals",
    tag = "Admin",
    responses((status = 200, body = [Transaction]))
)]
pub async fn pending_withdrawals(
    State(state): State<AppState>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let pending = state.withdrawals.pending().map_err(withdraw_error)?;
    Ok(Json(pending))
}

/// Approve a pending withdrawal.
///
/// Without `tx_hash` the payout is broadcast from the hot wallet; a
/// broadcast failure leaves the record pending for a retry or rejection.
#[utoipa::path(
    post,
    path = "/v1/admin/withdrawals/{tx_id}/approve",
    params(
        ("tx_id" = String, Path, description = "Pending withdrawal record id")
    ),
    request_body = ApproveRequest,
    tag = "Admin",
    responses(
        (status = 200, body = Transaction),
        (status = 404, description = "No such withdrawal"),
        (status = 422, description = "Record is not pending"),
        (status = 503, description = "Hot wallet unavailable or broadcast failed")
    )
)]
pub async fn approve_withdrawal(
    Path(tx_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<Transaction>, ApiError> {
    let settled = state
        .withdrawals
        .approve(&tx_id, request.note.as_deref(), request.tx_hash.as_deref())
        .await
        .map_err(withdraw_error)?;
    Ok(Json(settled))
}

/// Reject a pending withdrawal and return the funds.
#[utoipa::path(
    post,
    path = "/v1/admin/withdrawals/{tx_id}/reject",
    params(
        ("tx_id" = String, Path, description = "Pending withdrawal record id")
    ),
    request_body = RejectRequest,
    tag = "Admin",
    responses(
        (status = 200, body = Transaction),
        (status = 404, description = "No such withdrawal"),
        (status = 422, description = "Record is not pending")
    )
)]
pub async fn reject_withdrawal(
    Path(tx_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<Transaction>, ApiError> {
    let rejected = state
        .withdrawals
        .reject(&tx_id, request.note.as_deref())
        .map_err(withdraw_error)?;
    Ok(Json(rejected))
}

/// Sweep every deposit address into a treasury address.
#[utoipa::path(
    post,
    path = "/v1/admin/sweep",
    request_body = SweepRequest,
    tag = "Admin",
    responses(
        (status = 200, body = SweepReport),
        (status = 400, description = "Invalid destination address")
    )
)]
pub async fn sweep_funds(
    State(state): State<AppState>,
    Json(request): Json<SweepRequest>,
) -> Result<Json<SweepReport>, ApiError> {
    let report = state
        .sweeper
        .sweep_all(&request.destination)
        .await
        .map_err(|e| match e {
            SweepError::InvalidDestination(_) => ApiError::bad_request(e.to_string()),
            SweepError::Chain(_) => ApiError::service_unavailable(e.to_string()),
            SweepError::Ledger(_) => internal(e),
        })?;
    Ok(Json(report))
}
