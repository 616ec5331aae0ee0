// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::consensus::{TxEip1559, TxLegacy};
use alloy::primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

/// A sniper's pending bid for one token, as handed over by the bot
/// collaborator. Immutable once created; only its store row changes status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnipeBid {
    pub user_id: String,
    pub token: Address,
    /// Native currency spent on the swap itself, in wei.
    pub swap_amount: U256,
    /// Payment to the token creator, in wei. Must be positive.
    pub bribe_amount: U256,
    pub wallet: Address,
    /// Hex-encoded signing key. Parsed into a signer only at submission time.
    pub credential: String,
}

/// Detected liquidity-add, carried from the proxy into the auction pipeline.
/// The raw transaction bytes are kept verbatim; the event is never rebuilt
/// from call data alone.
#[derive(Clone, Debug)]
pub struct LiquidityAddEvent {
    pub token: Address,
    pub creator: Address,
    pub raw_tx: Bytes,
    /// Deadline word of the addLiquidityETH call, unix seconds.
    pub call_deadline: Option<u64>,
}

/// Transaction encoding family, carried explicitly so recovery and bundle
/// construction never guess the signature scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxFormat {
    Legacy,
    Eip2930,
    Eip1559,
}

/// Which fee knob the bundle ladder decrements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeMode {
    FeeMarket,
    Legacy,
}

/// Unsigned sniper transaction, one per winning bid.
#[derive(Clone, Debug)]
pub enum SnipeTx {
    FeeMarket(TxEip1559),
    Legacy(TxLegacy),
}

impl SnipeTx {
    pub fn effective_fee(&self) -> u128 {
        match self {
            SnipeTx::FeeMarket(tx) => tx.max_fee_per_gas,
            SnipeTx::Legacy(tx) => tx.gas_price,
        }
    }

    pub fn nonce(&self) -> u64 {
        match self {
            SnipeTx::FeeMarket(tx) => tx.nonce,
            SnipeTx::Legacy(tx) => tx.nonce,
        }
    }
}

/// One position of a bundle. Position 0 carries the untouched liquidity-add
/// bytes and no bid.
#[derive(Clone, Debug)]
pub enum BundleTransaction {
    Lead { raw: Bytes },
    Snipe { position: usize, bid: SnipeBid, tx: SnipeTx },
}

impl BundleTransaction {
    pub fn position(&self) -> usize {
        match self {
            BundleTransaction::Lead { .. } => 0,
            BundleTransaction::Snipe { position, .. } => *position,
        }
    }
}

/// Ordered transaction group headed by the liquidity-add transaction.
/// Built once per resolved auction, submitted once, then dropped.
#[derive(Clone, Debug)]
pub struct Bundle {
    pub token: Address,
    pub transactions: Vec<BundleTransaction>,
    /// Unix seconds after which remaining submissions are aborted.
    pub deadline: u64,
}

impl Bundle {
    pub fn sniper_count(&self) -> usize {
        self.transactions.len().saturating_sub(1)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitStatus {
    Accepted,
    Failed(String),
    Skipped(String),
}

/// Per-position submission result; one failure never rolls back earlier
/// positions (there is no rollback primitive once the lead tx is out).
#[derive(Clone, Debug)]
pub struct SubmissionOutcome {
    pub position: usize,
    pub tx_hash: Option<B256>,
    pub status: SubmitStatus,
}
