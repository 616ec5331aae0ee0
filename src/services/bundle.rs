// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::time::current_unix;
use crate::domain::types::{
    Bundle, BundleTransaction, FeeMode, LiquidityAddEvent, SnipeBid, SnipeTx,
};
use crate::infrastructure::network::gas::StartingFees;
use crate::infrastructure::network::nonce::NonceFetcher;
use crate::services::recovery;
use alloy::consensus::{Transaction as ConsensusTx, TxEip1559, TxLegacy};
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::sol;
use alloy_sol_types::SolCall;
use std::time::Duration;

sol! {
    /// External atomic swap+bribe contract. The call swaps `msg.value -
    /// bribeAmount` into `token` and forwards `bribeAmount` to `creator` in
    /// the same execution.
    interface SniperExecutor {
        function snipeWithBribe(
            address token,
            address payable creator,
            uint256 amountOutMin,
            uint256 deadline,
            uint256 bribeAmount
        ) external payable;
    }
}

/// Minimal slippage guard: the auction ladder, not the swap bound, is the
/// ordering mechanism, so snipes accept any output above one wei.
const AMOUNT_OUT_MIN_WEI: u64 = 1;

/// Fee for ladder position `index` (1-based; position 0 is the untouched
/// liquidity-add transaction).
pub fn ladder_fee(anchor: u128, index: usize, step: u128, min_fee: u128) -> u128 {
    anchor
        .saturating_sub(step.saturating_mul(index as u128))
        .max(min_fee)
}

pub struct BundleBuilder {
    sniper_contract: Address,
    chain_id: u64,
    fee_mode: FeeMode,
    gas_limit: u64,
    fee_step: u128,
    min_fee: u128,
    snipe_deadline: Duration,
    nonces: NonceFetcher,
}

impl BundleBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sniper_contract: Address,
        chain_id: u64,
        fee_mode: FeeMode,
        gas_limit: u64,
        fee_step: u128,
        min_fee: u128,
        snipe_deadline: Duration,
        nonces: NonceFetcher,
    ) -> Self {
        Self {
            sniper_contract,
            chain_id,
            fee_mode,
            gas_limit,
            fee_step,
            min_fee,
            snipe_deadline,
            nonces,
        }
    }

    /// Construct the bundle for one resolved auction. Position 0 carries the
    /// original liquidity-add bytes unmodified; every bidder position gets a
    /// strictly lower fee than the one before it so a fee-ordering sequencer
    /// reproduces the auction order.
    ///
    /// A failure for one bidder (nonce fetch, overflow) skips that bidder
    /// only; the remaining positions keep their ladder fees.
    pub async fn build(
        &self,
        event: &LiquidityAddEvent,
        ordered: Vec<SnipeBid>,
        start: StartingFees,
    ) -> Bundle {
        let anchor = self.ladder_anchor(event, &start);
        let now = current_unix();
        let snipe_deadline = now.saturating_add(self.snipe_deadline.as_secs());
        let bundle_deadline = match event.call_deadline {
            Some(lead_deadline) if lead_deadline > 0 => lead_deadline.min(snipe_deadline),
            _ => snipe_deadline,
        };

        let mut transactions = vec![BundleTransaction::Lead {
            raw: event.raw_tx.clone(),
        }];

        for (idx, bid) in ordered.into_iter().enumerate() {
            let ladder_index = idx + 1;
            let fee = ladder_fee(anchor, ladder_index, self.fee_step, self.min_fee);

            let Some(value) = bid.swap_amount.checked_add(bid.bribe_amount) else {
                tracing::warn!(
                    target: "bundle",
                    user = %bid.user_id,
                    wallet = %bid.wallet,
                    "Skipping bid whose swap+bribe value overflows"
                );
                continue;
            };

            let nonce = match self.nonces.pending_nonce(bid.wallet).await {
                Ok(nonce) => nonce,
                Err(e) => {
                    tracing::warn!(
                        target: "bundle",
                        user = %bid.user_id,
                        wallet = %bid.wallet,
                        error = %e,
                        "Skipping bid after nonce fetch failure"
                    );
                    continue;
                }
            };

            let input = SniperExecutor::snipeWithBribeCall {
                token: bid.token,
                creator: event.creator,
                amountOutMin: U256::from(AMOUNT_OUT_MIN_WEI),
                deadline: U256::from(snipe_deadline),
                bribeAmount: bid.bribe_amount,
            }
            .abi_encode();

            let tx = match self.fee_mode {
                FeeMode::FeeMarket => SnipeTx::FeeMarket(TxEip1559 {
                    chain_id: self.chain_id,
                    nonce,
                    max_priority_fee_per_gas: start.max_priority_fee_per_gas.min(fee),
                    max_fee_per_gas: fee,
                    gas_limit: self.gas_limit,
                    to: TxKind::Call(self.sniper_contract),
                    value,
                    input: Bytes::from(input),
                    ..Default::default()
                }),
                FeeMode::Legacy => SnipeTx::Legacy(TxLegacy {
                    chain_id: Some(self.chain_id),
                    nonce,
                    gas_price: fee,
                    gas_limit: self.gas_limit,
                    to: TxKind::Call(self.sniper_contract),
                    value,
                    input: Bytes::from(input),
                }),
            };

            tracing::debug!(
                target: "bundle",
                position = transactions.len(),
                user = %bid.user_id,
                fee,
                nonce,
                "Snipe transaction constructed"
            );
            transactions.push(BundleTransaction::Snipe {
                position: transactions.len(),
                bid,
                tx,
            });
        }

        Bundle {
            token: event.token,
            transactions,
            deadline: bundle_deadline,
        }
    }

    /// The ladder anchors on the liquidity-add transaction's own fee so every
    /// bidder position prices in strictly behind it; when the lead fee is
    /// unreadable the oracle's capped starting fee stands in.
    fn ladder_anchor(&self, event: &LiquidityAddEvent, start: &StartingFees) -> u128 {
        match recovery::decode_raw_transaction(&event.raw_tx) {
            Ok(envelope) => envelope.max_fee_per_gas().min(start.max_fee_per_gas),
            Err(e) => {
                tracing::debug!(
                    target: "bundle",
                    error = %e,
                    "Lead transaction unreadable for fee anchoring, using oracle fee"
                );
                start.max_fee_per_gas
            }
        }
    }
}
