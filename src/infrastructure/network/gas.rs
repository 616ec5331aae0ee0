// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::retry::retry_async;
use crate::domain::error::AppError;
use crate::network::provider::HttpProvider;
use alloy::providers::Provider;
use alloy::rpc::types::BlockNumberOrTag;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BASE_FEE_BUFFER_WEI: u128 = 1_000_000_000;

#[derive(Clone)]
pub struct GasOracle {
    provider: HttpProvider,
    priority_fee: u128,
    max_fee_cap: u128,
    last_good: Arc<Mutex<Option<StartingFees>>>,
}

/// Fee parameters for bundle position 1, before the ladder decrements.
#[derive(Debug, Clone, Copy)]
pub struct StartingFees {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub base_fee_per_gas: u128,
}

impl GasOracle {
    pub fn new(provider: HttpProvider, priority_fee: u128, max_fee_cap: u128) -> Self {
        Self {
            provider,
            priority_fee,
            max_fee_cap,
            last_good: Arc::new(Mutex::new(None)),
        }
    }

    /// Starting max fee = latest base fee + fixed priority fee + 1 gwei
    /// buffer, clamped at the configured cap. Falls back to the last good
    /// reading, then to the node's priority-fee suggestion.
    pub async fn starting_fees(&self) -> Result<StartingFees, AppError> {
        match self.base_fee_from_latest_block().await {
            Ok(base) => {
                let fees = self.fees_from_base(base);
                if let Ok(mut guard) = self.last_good.lock() {
                    *guard = Some(fees);
                }
                Ok(fees)
            }
            Err(err) => {
                if let Ok(guard) = self.last_good.lock()
                    && let Some(fees) = *guard
                {
                    tracing::debug!(target: "gas", error = %err, "Using last good fee reading");
                    return Ok(fees);
                }
                self.fallback_estimate().await
            }
        }
    }

    fn fees_from_base(&self, base: u128) -> StartingFees {
        let uncapped = base
            .saturating_add(self.priority_fee)
            .saturating_add(BASE_FEE_BUFFER_WEI);
        StartingFees {
            max_fee_per_gas: uncapped.min(self.max_fee_cap),
            max_priority_fee_per_gas: self.priority_fee,
            base_fee_per_gas: base,
        }
    }

    async fn base_fee_from_latest_block(&self) -> Result<u128, AppError> {
        let provider = self.provider.clone();
        let block = retry_async(
            move |_| {
                let provider = provider.clone();
                async move {
                    provider
                        .get_block_by_number(BlockNumberOrTag::Latest)
                        .await
                }
            },
            3,
            Duration::from_millis(100),
        )
        .await
        .map_err(|e| AppError::Connection(format!("Latest block fetch failed: {}", e)))?;

        block
            .as_ref()
            .and_then(|b| b.header.base_fee_per_gas)
            .map(u128::from)
            .ok_or_else(|| AppError::Initialization("Latest block carries no base fee".into()))
    }

    async fn fallback_estimate(&self) -> Result<StartingFees, AppError> {
        // Path for nodes that return pre-fee-market headers.
        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| AppError::Connection(format!("Gas price fetch failed: {}", e)))?;

        Ok(StartingFees {
            max_fee_per_gas: gas_price.min(self.max_fee_cap),
            max_priority_fee_per_gas: self.priority_fee.min(gas_price),
            base_fee_per_gas: gas_price.saturating_sub(self.priority_fee),
        })
    }
}
