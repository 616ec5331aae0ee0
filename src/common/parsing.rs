// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::primitives::{Address, U256};
use std::str::FromStr;

pub fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

pub fn parse_hex_bytes(s: &str) -> Option<Vec<u8>> {
    hex::decode(strip_0x(s)).ok()
}

pub fn parse_address_hex(s: &str) -> Option<Address> {
    Address::from_str(strip_0x(s)).ok()
}

/// Parse a decimal native-currency amount ("0.25") into wei.
///
/// Integer arithmetic throughout; a float path would round wei and make
/// equal-looking bribes compare unequal.
pub fn parse_eth_amount(raw: &str) -> Option<U256> {
    const DECIMALS: usize = 18;
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') {
        return None;
    }

    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if frac.len() > DECIMALS || (whole.is_empty() && frac.is_empty()) {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole_wei = U256::from_str(if whole.is_empty() { "0" } else { whole })
        .ok()?
        .checked_mul(U256::from(10u64).pow(U256::from(DECIMALS)))?;
    let frac_padded = format!("{:0<width$}", frac, width = DECIMALS);
    let frac_wei = U256::from_str(&frac_padded).ok()?;

    whole_wei.checked_add(frac_wei)
}

/// Parse a wei amount stored as a decimal string.
pub fn parse_wei_amount(raw: &str) -> Option<U256> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    U256::from_str(trimmed).ok()
}
