// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::retry::retry_async;
use crate::domain::error::AppError;
use crate::network::provider::HttpProvider;
use alloy::primitives::Address;
use alloy::providers::Provider;
use std::time::Duration;

/// Per-address pending-nonce lookups.
///
/// Bidders are distinct wallets with no shared nonce space, so there is no
/// cross-address cache here; each bundle build fetches each bidder's nonce
/// once. The window between fetch and inclusion is an accepted race: one
/// wallet serves one user performing one action at a time.
#[derive(Clone)]
pub struct NonceFetcher {
    provider: HttpProvider,
}

impl NonceFetcher {
    pub fn new(provider: HttpProvider) -> Self {
        Self { provider }
    }

    pub async fn pending_nonce(&self, address: Address) -> Result<u64, AppError> {
        let provider = self.provider.clone();
        retry_async(
            move |_| {
                let provider = provider.clone();
                async move { provider.get_transaction_count(address).pending().await }
            },
            3,
            Duration::from_millis(100),
        )
        .await
        .map_err(|e| AppError::Connection(format!("Failed to fetch nonce for {address}: {e}")))
    }
}
