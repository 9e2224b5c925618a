// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! # Ledger Amount Arithmetic
//!
//! Balances and transaction amounts are stored as decimal strings and all
//! arithmetic happens on `u128` minor units at a per-currency scale, so no
//! floating point ever touches money. Crypto currencies carry 8 decimal
//! places; fiat-pegged codes carry 2.

/// Decimal places for crypto currencies.
pub const CRYPTO_SCALE: u32 = 8;

/// Decimal places for fiat-pegged currencies.
pub const FIAT_SCALE: u32 = 2;

/// Currency codes treated as fiat-pegged.
const FIAT_PEGGED: &[&str] = &["INR", "USD", "EUR"];

/// Errors from amount parsing and arithmetic.
#[derive(Debug, thiserror::Error)]
pub enum AmountError {
    #[error("invalid amount `{0}`")]
    Invalid(String),

    #[error("too many decimal places in `{0}` (max {1})")]
    TooPrecise(String, u32),

    #[error("amount overflow")]
    Overflow,
}

/// Decimal places used for a currency code.
pub fn scale_for(currency: &str) -> u32 {
    if FIAT_PEGGED
        .iter()
        .any(|code| code.eq_ignore_ascii_case(currency))
    {
        FIAT_SCALE
    } else {
        CRYPTO_SCALE
    }
}

/// Parses a decimal string into minor units at `scale`.
///
/// Strict: digits with at most one decimal point, no sign, no precision
/// beyond `scale`.
pub fn parse_units(amount: &str, scale: u32) -> Result<u128, AmountError> {
    let parts: Vec<&str> = amount.split('.').collect();

    if parts.len() > 2 {
        return Err(AmountError::Invalid(amount.to_string()));
    }

    let whole = parts[0]
        .parse::<u128>()
        .map_err(|_| AmountError::Invalid(amount.to_string()))?;

    let fraction = if parts.len() == 2 {
        let dec_str = parts[1];
        if dec_str.len() > scale as usize {
            return Err(AmountError::TooPrecise(amount.to_string(), scale));
        }
        let padded = format!("{:0<width$}", dec_str, width = scale as usize);
        padded
            .parse::<u128>()
            .map_err(|_| AmountError::Invalid(amount.to_string()))?
    } else {
        0u128
    };

    whole
        .checked_mul(10u128.pow(scale))
        .and_then(|w| w.checked_add(fraction))
        .ok_or(AmountError::Overflow)
}

/// Formats minor units back into a decimal string, trimming trailing
/// zeros.
pub fn format_units(units: u128, scale: u32) -> String {
    if units == 0 {
        return "0".to_string();
    }

    let divisor = 10u128.pow(scale);
    let whole = units / divisor;
    let remainder = units % divisor;

    if remainder == 0 {
        whole.to_string()
    } else {
        let decimal_str = format!("{:0>width$}", remainder, width = scale as usize);
        let trimmed = decimal_str.trim_end_matches('0');
        format!("{}.{}", whole, trimmed)
    }
}
