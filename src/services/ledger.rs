// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::types::SnipeBid;
use alloy::primitives::Address;
use dashmap::DashMap;

/// In-memory pending-bid buckets, one per token.
///
/// Insert and drain contend on the same per-bucket lock, so a bid inserted
/// during a drain lands either fully before or fully after the drain
/// boundary; it is never split across two auctions or lost. Drain removes
/// the bucket outright, which makes a duplicate drain an empty no-op by
/// construction rather than by deduplication.
#[derive(Default)]
pub struct BidLedger {
    buckets: DashMap<Address, Vec<SnipeBid>>,
}

impl BidLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bid(&self, bid: SnipeBid) {
        let token = bid.token;
        self.buckets.entry(token).or_default().push(bid);
        tracing::debug!(target: "ledger", token = %token, "Bid registered");
    }

    /// Atomically take every pending bid for `token`. The lock is held for
    /// the map operation only, never across I/O.
    pub fn drain(&self, token: Address) -> Vec<SnipeBid> {
        self.buckets
            .remove(&token)
            .map(|(_, bids)| bids)
            .unwrap_or_default()
    }

    pub fn pending(&self, token: Address) -> usize {
        self.buckets.get(&token).map(|b| b.len()).unwrap_or(0)
    }
}
