// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! # Explorer API Client
//!
//! Client for the Etherscan-family explorer APIs the deposit watcher polls.
//! Two calls are used per scan: the chain head height (`proxy` module) and
//! the per-address transaction history (`account` module).
//!
//! One operator API key (`EXPLORER_API_KEY`) is shared across all
//! configured networks. Without it the watcher is disabled at startup;
//! nothing else in the service needs the explorer.
//!
//! Explorer responses carry every numeric field as a string and signal
//! "no transactions" through a non-OK status envelope, so the raw payload
//! is normalized here into [`ExplorerTransfer`] before anything else sees
//! it.

use std::time::Duration;

use alloy::primitives::U256;
use serde::Deserialize;
use serde_json::Value;

use super::types::ChainConfig;
use crate::config;

/// Ceiling for one explorer HTTP round trip.
const EXPLORER_TIMEOUT: Duration = Duration::from_secs(10);

// ===== Errors =====

/// Errors produced by explorer queries.
#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    /// `EXPLORER_API_KEY` is not set.
    #[error("explorer API key is not configured")]
    MissingApiKey,

    /// The HTTP request failed or returned a non-success status.
    #[error("explorer request failed: {0}")]
    Request(String),

    /// The response body could not be interpreted.
    #[error("explorer response was invalid: {0}")]
    InvalidResponse(String),
}

// ===== Normalized payloads =====

/// One transfer from an address history listing, with explorer string
/// fields already parsed.
#[derive(Debug, Clone)]
pub struct ExplorerTransfer {
    /// Transaction hash, `0x`-prefixed.
    pub hash: String,
    /// Sender address.
    pub from: String,
    /// Recipient address. Empty for contract creations.
    pub to: String,
    /// Transferred value in wei.
    pub value: U256,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Whether the transaction reverted.
    pub failed: bool,
}

// ===== Wire format =====

#[derive(Debug, Deserialize)]
struct ProxyEnvelope {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    #[allow(dead_code)]
    status: String,
    message: String,
    result: Value,
}

#[derive(Debug, Deserialize)]
struct RawTransfer {
    hash: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    #[serde(rename = "blockNumber")]
    block_number: String,
    #[serde(rename = "isError", default)]
    is_error: String,
}

// ===== Client =====

/// Explorer API client shared by all networks.
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    http: reqwest::Client,
    api_key: String,
}

impl ExplorerClient {
    /// Whether `EXPLORER_API_KEY` is present and non-blank.
    pub fn is_configured() -> bool {
        std::env::var(config::EXPLORER_API_KEY_ENV)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    }

    /// Builds a client from the environment.
    pub fn from_env() -> Result<Self, ExplorerError> {
        let api_key = std::env::var(config::EXPLORER_API_KEY_ENV)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ExplorerError::MissingApiKey)?;
        Self::new(api_key)
    }

    /// Builds a client with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ExplorerError> {
        let http = reqwest::Client::builder()
            .timeout(EXPLORER_TIMEOUT)
            .build()
            .map_err(|e| ExplorerError::Request(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
        })
    }

    /// Current chain head height on `chain`.
    pub async fn block_number(&self, chain: &ChainConfig) -> Result<u64, ExplorerError> {
        let response = self
            .http
            .get(chain.explorer_api_url)
            .query(&[
                ("module", "proxy"),
                ("action", "eth_blockNumber"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ExplorerError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| ExplorerError::Request(e.to_string()))?;

        let envelope: ProxyEnvelope = response
            .json()
            .await
            .map_err(|e| ExplorerError::InvalidResponse(e.to_string()))?;

        parse_hex_u64(&envelope.result)
    }

    /// Transaction history for `address` on `chain`, newest first.
    ///
    /// An address with no history returns an empty vec, not an error.
    pub async fn address_transactions(
        &self,
        chain: &ChainConfig,
        address: &str,
    ) -> Result<Vec<ExplorerTransfer>, ExplorerError> {
        let response = self
            .http
            .get(chain.explorer_api_url)
            .query(&[
                ("module", "account"),
                ("action", "txlist"),
                ("address", address),
                ("startblock", "0"),
                ("endblock", "99999999"),
                ("sort", "desc"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ExplorerError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| ExplorerError::Request(e.to_string()))?;

        let envelope: ListEnvelope = response
            .json()
            .await
            .map_err(|e| ExplorerError::InvalidResponse(e.to_string()))?;

        parse_transfers(envelope)
    }
}

// ===== Parsing =====

fn parse_hex_u64(raw: &str) -> Result<u64, ExplorerError> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(stripped, 16)
        .map_err(|e| ExplorerError::InvalidResponse(format!("bad block height `{raw}`: {e}")))
}

/// Unpacks a history envelope.
///
/// "No transactions found" arrives as a non-OK status with an empty result
/// array; rate limiting and key errors arrive with a string result. Only
/// the latter is an error here.
fn parse_transfers(envelope: ListEnvelope) -> Result<Vec<ExplorerTransfer>, ExplorerError> {
    match envelope.result {
        Value::Array(entries) => entries
            .into_iter()
            .map(|entry| {
                let raw: RawTransfer = serde_json::from_value(entry)
                    .map_err(|e| ExplorerError::InvalidResponse(e.to_string()))?;
                normalize(raw)
            })
            .collect(),
        Value::String(detail) => Err(ExplorerError::InvalidResponse(format!(
            "{}: {}",
            envelope.message, detail
        ))),
        other => Err(ExplorerError::InvalidResponse(format!(
            "unexpected result payload: {other}"
        ))),
    }
}

fn normalize(raw: RawTransfer) -> Result<ExplorerTransfer, ExplorerError> {
    let value: U256 = raw
        .value
        .parse()
        .map_err(|e| ExplorerError::InvalidResponse(format!("bad value `{}`: {e}", raw.value)))?;
    let block_number: u64 = raw.block_number.parse().map_err(|e| {
        ExplorerError::InvalidResponse(format!("bad block number `{}`: {e}", raw.block_number))
    })?;

    Ok(ExplorerTransfer {
        hash: raw.hash,
        from: raw.from,
        to: raw.to,
        value,
        block_number,
        failed: raw.is_error == "1",
    })
}
