// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::types::{LiquidityAddEvent, SnipeBid, SubmitStatus};
use crate::infrastructure::data::db::Database;
use crate::infrastructure::network::gas::GasOracle;
use crate::services::auction;
use crate::services::bundle::BundleBuilder;
use crate::services::ledger::BidLedger;
use crate::services::submitter::BundleSender;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct PipelineStats {
    pub forwarded: AtomicU64,
    pub detections: AtomicU64,
    pub auctions: AtomicU64,
    pub bids_dropped: AtomicU64,
    pub submitted: AtomicU64,
    pub failed: AtomicU64,
}

/// Consumes detected liquidity-add events from a bounded queue and runs
/// drain → resolve → build → submit for each.
///
/// One token's auction is strictly sequential inside its own task; auctions
/// for different tokens run concurrently. The ledger lock is released before
/// any network I/O starts.
pub struct Pipeline {
    ledger: Arc<BidLedger>,
    db: Database,
    gas: GasOracle,
    builder: BundleBuilder,
    sender: BundleSender,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    pub fn new(
        ledger: Arc<BidLedger>,
        db: Database,
        gas: GasOracle,
        builder: BundleBuilder,
        sender: BundleSender,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            ledger,
            db,
            gas,
            builder,
            sender,
            stats,
        }
    }

    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<LiquidityAddEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "pipeline", "Pipeline shutting down");
                    return;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::info!(target: "pipeline", "Event queue closed");
                        return;
                    };
                    let pipeline = self.clone();
                    tokio::spawn(async move { pipeline.handle_event(event).await });
                }
            }
        }
    }

    pub async fn handle_event(&self, event: LiquidityAddEvent) {
        use std::sync::atomic::Ordering::Relaxed;

        let token = event.token;
        tracing::info!(
            target: "pipeline",
            token = %token,
            creator = %event.creator,
            "Liquidity add detected, starting auction"
        );

        let mut bids = self.ledger.drain(token);

        // Merge bids registered through the store; the in-memory ledger wins
        // on a per-user collision (both paths write the same bid).
        let mut store_ids = Vec::new();
        match self.db.pending_bids_for_token(token).await {
            Ok(rows) => {
                for (id, bid) in rows {
                    store_ids.push(id);
                    if !bids.iter().any(|b| b.user_id == bid.user_id) {
                        bids.push(bid);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(target: "pipeline", token = %token, error = %e, "Store read failed, using ledger bids only");
            }
        }

        if bids.is_empty() {
            tracing::info!(target: "pipeline", token = %token, "No pending bids, skipping bundle");
            return;
        }

        let candidate_count = bids.len();
        let ordered = auction::resolve(bids);
        self.stats
            .bids_dropped
            .fetch_add((candidate_count - ordered.len()) as u64, Relaxed);
        if ordered.is_empty() {
            tracing::info!(target: "pipeline", token = %token, "No valid bids after resolution");
            return;
        }
        self.stats.auctions.fetch_add(1, Relaxed);

        let fees = match self.gas.starting_fees().await {
            Ok(fees) => fees,
            Err(e) => {
                tracing::error!(target: "pipeline", token = %token, error = %e, "Fee estimation failed, dropping auction");
                return;
            }
        };

        let ordered_count = ordered.len();
        let bundle = self.builder.build(&event, ordered, fees).await;
        let built = bundle.sniper_count();
        if built < ordered_count {
            self.stats
                .bids_dropped
                .fetch_add((ordered_count - built) as u64, Relaxed);
        }
        tracing::info!(
            target: "pipeline",
            token = %token,
            snipes = built,
            deadline = bundle.deadline,
            "Bundle constructed"
        );

        let outcomes = self.sender.submit(&bundle).await;
        for outcome in &outcomes {
            match outcome.status {
                SubmitStatus::Accepted => {
                    self.stats.submitted.fetch_add(1, Relaxed);
                }
                _ => {
                    self.stats.failed.fetch_add(1, Relaxed);
                }
            }
        }

        if !store_ids.is_empty()
            && let Err(e) = self.db.mark_bids(&store_ids, "submitted").await
        {
            tracing::warn!(target: "pipeline", token = %token, error = %e, "Bid status update failed");
        }
    }
}

/// Register a validated bid with both the in-memory ledger and the store.
pub async fn register_bid(
    ledger: &BidLedger,
    db: &Database,
    bid: SnipeBid,
) -> Result<i64, crate::domain::error::AppError> {
    let id = db.insert_bid(&bid).await?;
    ledger.add_bid(bid);
    Ok(id)
}
