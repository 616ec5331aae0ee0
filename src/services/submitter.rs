// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::parsing::strip_0x;
use crate::common::time::current_unix;
use crate::domain::error::AppError;
use crate::domain::types::{
    Bundle, BundleTransaction, SnipeBid, SnipeTx, SubmissionOutcome, SubmitStatus,
};
use alloy::consensus::{SignableTransaction, TxEnvelope};
use alloy::eips::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{B256, keccak256};
use alloy::signers::local::PrivateKeySigner;
use serde_json::json;
use std::str::FromStr;
use std::time::Duration;

const SUBMIT_TIMEOUT_MS: u64 = 2_500;
const SUBMIT_MAX_ATTEMPTS: u64 = 2;

/// Sends bundle positions to the sequencer in order.
///
/// Ordering is a fee-priority hint, not an atomic guarantee: every position
/// is an independent `eth_sendRawTransaction`, and a rejection never halts
/// the positions behind it (nor can it roll the lead back — that transaction
/// is irrevocable once forwarded).
pub struct BundleSender {
    sequencer_url: String,
    dry_run: bool,
    client: reqwest::Client,
}

impl BundleSender {
    pub fn new(sequencer_url: String, dry_run: bool) -> Self {
        Self {
            sequencer_url,
            dry_run,
            client: reqwest::Client::new(),
        }
    }

    pub async fn submit(&self, bundle: &Bundle) -> Vec<SubmissionOutcome> {
        let mut outcomes = Vec::with_capacity(bundle.transactions.len());

        for entry in &bundle.transactions {
            let position = entry.position();

            if current_unix() > bundle.deadline {
                tracing::warn!(
                    target: "submit",
                    token = %bundle.token,
                    position,
                    deadline = bundle.deadline,
                    "Bundle deadline passed, aborting remaining submissions"
                );
                outcomes.push(SubmissionOutcome {
                    position,
                    tx_hash: None,
                    status: SubmitStatus::Skipped("bundle deadline exceeded".into()),
                });
                continue;
            }

            let outcome = match entry {
                BundleTransaction::Lead { raw } => {
                    let hash = keccak256(raw);
                    let status = match self.send_raw(raw.as_ref()).await {
                        Ok(()) => SubmitStatus::Accepted,
                        // The proxy already forwarded the lead; the sequencer
                        // seeing it twice is the normal case.
                        Err(e) if is_duplicate_error(&e) => {
                            tracing::debug!(target: "submit", hash = %hash, "Lead already known to sequencer");
                            SubmitStatus::Accepted
                        }
                        Err(e) => SubmitStatus::Failed(e.to_string()),
                    };
                    SubmissionOutcome {
                        position,
                        tx_hash: Some(hash),
                        status,
                    }
                }
                BundleTransaction::Snipe { bid, tx, .. } => self.submit_snipe(position, bid, tx).await,
            };

            match &outcome.status {
                SubmitStatus::Accepted => {
                    tracing::info!(
                        target: "submit",
                        token = %bundle.token,
                        position,
                        hash = ?outcome.tx_hash,
                        "Bundle position submitted"
                    );
                }
                SubmitStatus::Failed(reason) => {
                    tracing::warn!(
                        target: "submit",
                        token = %bundle.token,
                        position,
                        hash = ?outcome.tx_hash,
                        reason = %reason,
                        "Bundle position rejected, continuing"
                    );
                }
                SubmitStatus::Skipped(reason) => {
                    tracing::warn!(
                        target: "submit",
                        token = %bundle.token,
                        position,
                        reason = %reason,
                        "Bundle position skipped"
                    );
                }
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Sign with the bidder's credential immediately before the send; the
    /// parsed key lives only for this call.
    async fn submit_snipe(&self, position: usize, bid: &SnipeBid, tx: &SnipeTx) -> SubmissionOutcome {
        let (raw, hash) = match sign_snipe(bid, tx) {
            Ok(signed) => signed,
            Err(e) => {
                return SubmissionOutcome {
                    position,
                    tx_hash: None,
                    status: SubmitStatus::Skipped(e.to_string()),
                };
            }
        };

        let status = match self.send_raw(&raw).await {
            Ok(()) => SubmitStatus::Accepted,
            Err(e) => SubmitStatus::Failed(e.to_string()),
        };
        SubmissionOutcome {
            position,
            tx_hash: Some(hash),
            status,
        }
    }

    async fn send_raw(&self, raw: &[u8]) -> Result<(), AppError> {
        if self.dry_run {
            tracing::info!(target: "submit", bytes = raw.len(), "Dry-run: would send raw transaction");
            return Ok(());
        }

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_sendRawTransaction",
            "params": [format!("0x{}", hex::encode(raw))]
        });

        let mut attempts = 0u64;
        loop {
            attempts += 1;
            let resp = self
                .client
                .post(&self.sequencer_url)
                .header("Content-Type", "application/json")
                .json(&body)
                .timeout(Duration::from_millis(SUBMIT_TIMEOUT_MS))
                .send()
                .await;

            let resp = match resp {
                Ok(r) => r,
                Err(e) if attempts < SUBMIT_MAX_ATTEMPTS => {
                    tracing::warn!(target: "submit", error = %e, attempt = attempts, "Sequencer POST failed, retrying");
                    continue;
                }
                Err(e) => {
                    return Err(AppError::Connection(format!("Sequencer POST failed: {e}")));
                }
            };

            let status = resp.status();
            let body_text = resp.text().await.unwrap_or_default();
            if !status.is_success() {
                if attempts < SUBMIT_MAX_ATTEMPTS {
                    tracing::warn!(target: "submit", status = %status, attempt = attempts, "Sequencer rejected request, retrying");
                    continue;
                }
                return Err(AppError::Connection(format!(
                    "Sequencer returned {status}: {body_text}"
                )));
            }

            let parsed: serde_json::Value = serde_json::from_str(&body_text)
                .map_err(|e| AppError::Connection(format!("Sequencer response unreadable: {e}")))?;
            if let Some(error) = parsed.get("error")
                && !error.is_null()
            {
                let message = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown sequencer error");
                return Err(AppError::Transaction {
                    hash: String::new(),
                    reason: message.to_string(),
                });
            }
            return Ok(());
        }
    }
}

fn sign_snipe(bid: &SnipeBid, tx: &SnipeTx) -> Result<(Vec<u8>, B256), AppError> {
    let signer = PrivateKeySigner::from_str(strip_0x(&bid.credential))
        .map_err(|e| AppError::Signature(format!("credential unusable: {e}")))?;
    if signer.address() != bid.wallet {
        return Err(AppError::Validation {
            field: "credential".into(),
            message: format!(
                "derives {} instead of bidder wallet {}",
                signer.address(),
                bid.wallet
            ),
        });
    }

    let envelope: TxEnvelope = match tx.clone() {
        SnipeTx::FeeMarket(mut tx) => {
            let sig = signer
                .sign_transaction_sync(&mut tx)
                .map_err(|e| AppError::Signature(format!("sign failed: {e}")))?;
            tx.into_signed(sig).into()
        }
        SnipeTx::Legacy(mut tx) => {
            let sig = signer
                .sign_transaction_sync(&mut tx)
                .map_err(|e| AppError::Signature(format!("sign failed: {e}")))?;
            tx.into_signed(sig).into()
        }
    };

    let raw = envelope.encoded_2718();
    Ok((raw, *envelope.tx_hash()))
}

fn is_duplicate_error(err: &AppError) -> bool {
    let text = err.to_string().to_ascii_lowercase();
    text.contains("already known") || text.contains("already exists") || text.contains("known transaction")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::LiquidityAddEvent;
    use alloy::consensus::TxEip1559;
    use alloy::primitives::{Address, Bytes, TxKind, U256};

    fn snipe_bid(signer: &PrivateKeySigner) -> SnipeBid {
        SnipeBid {
            user_id: "u1".to_string(),
            token: Address::from([0xaa; 20]),
            swap_amount: U256::from(100u64),
            bribe_amount: U256::from(10u64),
            wallet: signer.address(),
            credential: hex::encode(signer.credential().to_bytes()),
        }
    }

    fn snipe_tx() -> SnipeTx {
        SnipeTx::FeeMarket(TxEip1559 {
            chain_id: 8453,
            nonce: 0,
            max_priority_fee_per_gas: 1,
            max_fee_per_gas: 10,
            gas_limit: 300_000,
            to: TxKind::Call(Address::from([0x05; 20])),
            value: U256::from(110u64),
            input: Bytes::new(),
            ..Default::default()
        })
    }

    #[test]
    fn signing_rejects_credential_that_derives_wrong_wallet() {
        let signer = PrivateKeySigner::random();
        let mut bid = snipe_bid(&signer);
        bid.wallet = Address::from([0x09; 20]);

        let err = sign_snipe(&bid, &snipe_tx()).expect_err("mismatch must fail");
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn signing_produces_recoverable_payload() {
        use crate::services::recovery;

        let signer = PrivateKeySigner::random();
        let bid = snipe_bid(&signer);
        let (raw, hash) = sign_snipe(&bid, &snipe_tx()).expect("sign");

        let envelope = recovery::decode_raw_transaction(&raw).expect("decode");
        assert_eq!(*envelope.tx_hash(), hash);
        let recovered = recovery::recover_sender(&envelope).expect("recover");
        assert_eq!(recovered.address, signer.address());
    }

    #[tokio::test]
    async fn dry_run_accepts_every_position_in_order() {
        let signer = PrivateKeySigner::random();
        let bundle = Bundle {
            token: Address::from([0xaa; 20]),
            transactions: vec![
                BundleTransaction::Lead {
                    raw: Bytes::from(vec![0x02, 0x01]),
                },
                BundleTransaction::Snipe {
                    position: 1,
                    bid: snipe_bid(&signer),
                    tx: snipe_tx(),
                },
            ],
            deadline: current_unix() + 60,
        };

        let sender = BundleSender::new("http://127.0.0.1:1".to_string(), true);
        let outcomes = sender.submit(&bundle).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.status == SubmitStatus::Accepted));
        assert_eq!(outcomes[0].position, 0);
        assert_eq!(outcomes[1].position, 1);
    }

    #[tokio::test]
    async fn expired_bundle_submits_nothing() {
        let event = LiquidityAddEvent {
            token: Address::from([0xaa; 20]),
            creator: Address::from([0xbb; 20]),
            raw_tx: Bytes::from(vec![0x02, 0x01]),
            call_deadline: None,
        };
        let bundle = Bundle {
            token: event.token,
            transactions: vec![BundleTransaction::Lead { raw: event.raw_tx }],
            deadline: 1,
        };

        let sender = BundleSender::new("http://127.0.0.1:1".to_string(), true);
        let outcomes = sender.submit(&bundle).await;
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].status, SubmitStatus::Skipped(_)));
    }
}
