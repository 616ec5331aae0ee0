// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::types::SnipeBid;

/// Order a drained bid set for bundling: bribe descending, arrival order on
/// ties.
///
/// The sort must stay stable — with an unstable sort, equal bribes would
/// resolve to a different permutation run to run. Bids with a non-positive
/// bribe or swap amount are excluded and reported individually; they never
/// fail the auction as a whole.
pub fn resolve(bids: Vec<SnipeBid>) -> Vec<SnipeBid> {
    let mut valid: Vec<SnipeBid> = bids
        .into_iter()
        .filter(|bid| {
            if bid.bribe_amount.is_zero() {
                tracing::warn!(
                    target: "auction",
                    user = %bid.user_id,
                    token = %bid.token,
                    "Excluding bid with zero bribe"
                );
                return false;
            }
            if bid.swap_amount.is_zero() {
                tracing::warn!(
                    target: "auction",
                    user = %bid.user_id,
                    token = %bid.token,
                    "Excluding bid with zero swap amount"
                );
                return false;
            }
            true
        })
        .collect();

    valid.sort_by(|a, b| b.bribe_amount.cmp(&a.bribe_amount));
    valid
}
