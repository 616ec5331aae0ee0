// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use alloy::primitives::{Address, U256, keccak256};

const WORD: usize = 32;
const SELECTOR: usize = 4;

/// createPair(address,address)
const CREATE_PAIR_SIGNATURE: &str = "createPair(address,address)";
/// addLiquidityETH(address,uint256,uint256,uint256,address,uint256)
const ADD_LIQUIDITY_ETH_SIGNATURE: &str =
    "addLiquidityETH(address,uint256,uint256,uint256,address,uint256)";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    None,
    CreatePair {
        token_a: Address,
        token_b: Address,
    },
    AddLiquidityNative {
        token: Address,
        amount_desired: U256,
        /// Deadline word of the call, unix seconds, saturated into u64.
        deadline: u64,
    },
}

/// Recognizes watched call patterns inside raw call data.
///
/// A selector only matches together with its configured destination address;
/// the same four bytes sent to an unrelated contract classify as `None`.
#[derive(Clone, Debug)]
pub struct Classifier {
    router: Address,
    factory: Address,
    create_pair: [u8; 4],
    add_liquidity_eth: [u8; 4],
}

fn selector_of(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

impl Classifier {
    pub fn new(router: Address, factory: Address) -> Self {
        Self {
            router,
            factory,
            create_pair: selector_of(CREATE_PAIR_SIGNATURE),
            add_liquidity_eth: selector_of(ADD_LIQUIDITY_ETH_SIGNATURE),
        }
    }

    /// Pure over (destination, input): identical bytes always classify the
    /// same way.
    pub fn classify(&self, to: Option<Address>, input: &[u8]) -> Classification {
        if input.len() < SELECTOR {
            return Classification::None;
        }
        let Some(to) = to else {
            return Classification::None;
        };
        let selector: [u8; 4] = match input[..SELECTOR].try_into() {
            Ok(s) => s,
            Err(_) => return Classification::None,
        };

        if selector == self.create_pair && to == self.factory {
            return match extract_create_pair(input) {
                Ok(classification) => classification,
                Err(e) => {
                    tracing::debug!(target: "classifier", error = %e, "createPair call data rejected");
                    Classification::None
                }
            };
        }
        if selector == self.add_liquidity_eth && to == self.router {
            return match extract_add_liquidity(input) {
                Ok(classification) => classification,
                Err(e) => {
                    tracing::debug!(target: "classifier", error = %e, "addLiquidityETH call data rejected");
                    Classification::None
                }
            };
        }
        Classification::None
    }
}

/// Fixed-width parameter word, bounds-checked against the declared word count.
fn param_word(input: &[u8], index: usize, expected_words: usize) -> Result<&[u8], AppError> {
    let required = SELECTOR + WORD * expected_words;
    if input.len() < required {
        return Err(AppError::Decode(format!(
            "call data too short: {} bytes, need {}",
            input.len(),
            required
        )));
    }
    let start = SELECTOR + WORD * index;
    Ok(&input[start..start + WORD])
}

fn address_in_word(word: &[u8]) -> Address {
    // Addresses occupy the low 20 bytes of their 32-byte word.
    Address::from_slice(&word[12..32])
}

fn extract_create_pair(input: &[u8]) -> Result<Classification, AppError> {
    const WORDS: usize = 2;
    let token_a = address_in_word(param_word(input, 0, WORDS)?);
    let token_b = address_in_word(param_word(input, 1, WORDS)?);
    Ok(Classification::CreatePair { token_a, token_b })
}

fn extract_add_liquidity(input: &[u8]) -> Result<Classification, AppError> {
    const WORDS: usize = 6;
    let token = address_in_word(param_word(input, 0, WORDS)?);
    let amount_desired = U256::from_be_slice(param_word(input, 1, WORDS)?);
    let deadline_word = U256::from_be_slice(param_word(input, 5, WORDS)?);
    let deadline = u64::try_from(deadline_word).unwrap_or(u64::MAX);
    Ok(Classification::AddLiquidityNative {
        token,
        amount_desired,
        deadline,
    })
}
