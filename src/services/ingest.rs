// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::parsing::{parse_address_hex, parse_eth_amount, parse_hex_bytes};
use crate::domain::error::AppError;
use crate::domain::types::{LiquidityAddEvent, SnipeBid};
use crate::infrastructure::data::db::Database;
use crate::services::classifier::{Classification, Classifier};
use crate::services::http1::{read_request, write_json, write_text};
use crate::services::ledger::BidLedger;
use crate::services::pipeline::register_bid;
use crate::services::recovery;
use alloy::consensus::Transaction as ConsensusTx;
use alloy::primitives::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const NOTIFY_TIMEOUT_MS: u64 = 5_000;

/// LP-add notification carried between the observing proxy and the auction
/// pipeline when they run as separate processes.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LpAddNotification {
    pub token_address: String,
    pub creator_address: String,
    pub tx_call_data: String,
}

/// Bid record handed over by the bot collaborator.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidSubmission {
    pub user_id: String,
    pub token_address: String,
    pub swap_amount: String,
    pub bribe_amount: String,
    pub wallet_address: Option<String>,
}

/// Bearer-token client for the `/api/lp-add` channel.
#[derive(Clone)]
pub struct NotifyClient {
    url: String,
    auth_token: String,
    client: reqwest::Client,
}

impl NotifyClient {
    pub fn new(url: String, auth_token: String) -> Self {
        Self {
            url,
            auth_token,
            client: reqwest::Client::new(),
        }
    }

    pub async fn notify_lp_add(&self, event: &LiquidityAddEvent) -> Result<(), AppError> {
        let payload = LpAddNotification {
            token_address: format!("{:#x}", event.token),
            creator_address: format!("{:#x}", event.creator),
            tx_call_data: format!("0x{}", hex::encode(&event.raw_tx)),
        };

        let resp = self
            .client
            .post(format!("{}/api/lp-add", self.url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.auth_token))
            .json(&payload)
            .timeout(Duration::from_millis(NOTIFY_TIMEOUT_MS))
            .send()
            .await
            .map_err(|e| AppError::Connection(format!("LP-add notify failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Connection(format!(
                "Bid API returned {status}: {body}"
            )));
        }
        Ok(())
    }
}

/// Bot-facing HTTP API: bid ingestion, LP-add notifications, health.
pub struct IngestServer {
    auth_token: String,
    db: Database,
    ledger: Arc<BidLedger>,
    classifier: Classifier,
    events: mpsc::Sender<LiquidityAddEvent>,
}

impl IngestServer {
    pub fn new(
        auth_token: String,
        db: Database,
        ledger: Arc<BidLedger>,
        classifier: Classifier,
        events: mpsc::Sender<LiquidityAddEvent>,
    ) -> Self {
        Self {
            auth_token,
            db,
            ledger,
            classifier,
            events,
        }
    }

    pub async fn run(
        self: Arc<Self>,
        port: u16,
        shutdown: CancellationToken,
    ) -> Result<(), AppError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await.map_err(|e| {
            AppError::Initialization(format!("Bid API failed to bind port {port}: {e}"))
        })?;
        tracing::info!(target: "ingest", port, "Bid API listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "ingest", "Bid API shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let server = self.clone();
                            tokio::spawn(async move { server.handle_connection(stream).await });
                        }
                        Err(e) => {
                            tracing::warn!(target: "ingest", error = %e, "Accept failed");
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) {
        let request = match read_request(&mut stream).await {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(target: "ingest", error = %e, "Unreadable request");
                write_text(&mut stream, "400 Bad Request", "Failed to read request").await;
                return;
            }
        };

        match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/health") => write_text(&mut stream, "200 OK", "OK").await,
            ("POST", "/api/lp-add") => {
                if !self.authorized(request.authorization.as_deref()) {
                    tracing::warn!(target: "ingest", "Unauthorized LP-add notification");
                    write_text(&mut stream, "401 Unauthorized", "Unauthorized").await;
                    return;
                }
                self.handle_lp_add(&mut stream, &request.body).await;
            }
            ("POST", "/api/bids") => {
                if !self.authorized(request.authorization.as_deref()) {
                    tracing::warn!(target: "ingest", "Unauthorized bid submission");
                    write_text(&mut stream, "401 Unauthorized", "Unauthorized").await;
                    return;
                }
                self.handle_bid(&mut stream, &request.body).await;
            }
            _ => write_text(&mut stream, "404 Not Found", "Not found").await,
        }
    }

    fn authorized(&self, header: Option<&str>) -> bool {
        let expected = format!("Bearer {}", self.auth_token);
        header.is_some_and(|value| value == expected)
    }

    async fn handle_lp_add(&self, stream: &mut TcpStream, body: &[u8]) {
        let notification: LpAddNotification = match serde_json::from_slice(body) {
            Ok(notification) => notification,
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, "Malformed LP-add payload");
                write_text(stream, "400 Bad Request", "Invalid JSON").await;
                return;
            }
        };

        let (Some(token), Some(creator)) = (
            parse_address_hex(&notification.token_address),
            parse_address_hex(&notification.creator_address),
        ) else {
            write_text(stream, "400 Bad Request", "Invalid address in payload").await;
            return;
        };
        let Some(raw) = parse_hex_bytes(&notification.tx_call_data) else {
            write_text(stream, "400 Bad Request", "Invalid transaction hex").await;
            return;
        };

        // Re-derive the call deadline from the carried raw transaction; the
        // payload itself stays authoritative for token and creator.
        let call_deadline = recovery::decode_raw_transaction(&raw)
            .ok()
            .and_then(|envelope| {
                match self
                    .classifier
                    .classify(envelope.to(), envelope.input().as_ref())
                {
                    Classification::AddLiquidityNative { deadline, .. } => Some(deadline),
                    _ => None,
                }
            });

        let event = LiquidityAddEvent {
            token,
            creator,
            raw_tx: Bytes::from(raw),
            call_deadline,
        };

        tracing::info!(
            target: "ingest",
            token = %token,
            creator = %creator,
            "LP-add notification accepted"
        );
        if let Err(e) = self.events.try_send(event) {
            tracing::warn!(target: "ingest", error = %e, "Event queue full, notification dropped");
            write_text(stream, "503 Service Unavailable", "Pipeline busy").await;
            return;
        }

        // Processing is asynchronous; acknowledge immediately.
        write_json(
            stream,
            "200 OK",
            &json!({
                "status": "success",
                "message": "LP-add notification received and processing started",
                "data": {
                    "tokenAddress": notification.token_address,
                    "creatorAddress": notification.creator_address,
                }
            }),
        )
        .await;
    }

    async fn handle_bid(&self, stream: &mut TcpStream, body: &[u8]) {
        let submission: BidSubmission = match serde_json::from_slice(body) {
            Ok(submission) => submission,
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, "Malformed bid payload");
                write_text(stream, "400 Bad Request", "Invalid JSON").await;
                return;
            }
        };

        match self.validate_bid(&submission).await {
            Ok(bid) => {
                let user = bid.user_id.clone();
                let token = bid.token;
                match register_bid(&self.ledger, &self.db, bid).await {
                    Ok(id) => {
                        tracing::info!(
                            target: "ingest",
                            user = %user,
                            token = %token,
                            bid_id = id,
                            "Bid registered"
                        );
                        write_json(stream, "200 OK", &json!({ "status": "ok", "id": id })).await;
                    }
                    Err(e) => {
                        tracing::error!(target: "ingest", user = %user, error = %e, "Bid persistence failed");
                        write_text(stream, "500 Internal Server Error", "Failed to store bid").await;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, "Bid rejected");
                write_json(
                    stream,
                    "400 Bad Request",
                    &json!({ "status": "error", "error": e.to_string() }),
                )
                .await;
            }
        }
    }

    /// Validation boundary for bid records: one bad bid is rejected here and
    /// never reaches the ledger; other bids are unaffected.
    async fn validate_bid(&self, submission: &BidSubmission) -> Result<SnipeBid, AppError> {
        if submission.user_id.trim().is_empty() {
            return Err(AppError::Validation {
                field: "userId".into(),
                message: "must not be empty".into(),
            });
        }
        let token = parse_address_hex(&submission.token_address).ok_or_else(|| {
            AppError::Validation {
                field: "tokenAddress".into(),
                message: "not a valid address".into(),
            }
        })?;
        let swap_amount = parse_eth_amount(&submission.swap_amount)
            .filter(|v| !v.is_zero())
            .ok_or_else(|| AppError::Validation {
                field: "swapAmount".into(),
                message: "must be a positive decimal amount".into(),
            })?;
        let bribe_amount = parse_eth_amount(&submission.bribe_amount)
            .filter(|v| !v.is_zero())
            .ok_or_else(|| AppError::Validation {
                field: "bribeAmount".into(),
                message: "must be a positive decimal amount".into(),
            })?;

        let wallet = self
            .db
            .wallet_for_user(&submission.user_id)
            .await?
            .ok_or_else(|| AppError::Validation {
                field: "userId".into(),
                message: "no wallet registered for user".into(),
            })?;
        if let Some(claimed) = &submission.wallet_address {
            let claimed = parse_address_hex(claimed).ok_or_else(|| AppError::Validation {
                field: "walletAddress".into(),
                message: "not a valid address".into(),
            })?;
            if claimed != wallet.address {
                return Err(AppError::Validation {
                    field: "walletAddress".into(),
                    message: "does not match the registered wallet".into(),
                });
            }
        }

        Ok(SnipeBid {
            user_id: submission.user_id.clone(),
            token,
            swap_amount,
            bribe_amount,
            wallet: wallet.address,
            credential: wallet.private_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use alloy::signers::local::PrivateKeySigner;

    async fn server_with_wallet(user: &str) -> (IngestServer, Address) {
        let db = Database::new("sqlite::memory:").await.expect("db");
        let signer = PrivateKeySigner::random();
        db.create_wallet(
            user,
            signer.address(),
            &hex::encode(signer.credential().to_bytes()),
        )
        .await
        .expect("wallet");

        let ledger = Arc::new(BidLedger::new());
        let classifier = Classifier::new(Address::from([0x01; 20]), Address::from([0x02; 20]));
        let (events, _rx) = mpsc::channel(4);

        (
            IngestServer::new("secret".to_string(), db, ledger, classifier, events),
            signer.address(),
        )
    }

    fn submission(user: &str, swap: &str, bribe: &str) -> BidSubmission {
        BidSubmission {
            user_id: user.to_string(),
            token_address: format!("{:#x}", Address::from([0xaa; 20])),
            swap_amount: swap.to_string(),
            bribe_amount: bribe.to_string(),
            wallet_address: None,
        }
    }

    #[tokio::test]
    async fn valid_submission_resolves_wallet_and_wei_amounts() {
        let (server, wallet) = server_with_wallet("u1").await;
        let bid = server
            .validate_bid(&submission("u1", "0.5", "0.25"))
            .await
            .expect("valid bid");

        assert_eq!(bid.wallet, wallet);
        assert_eq!(bid.swap_amount, U256::from(500_000_000_000_000_000u128));
        assert_eq!(bid.bribe_amount, U256::from(250_000_000_000_000_000u128));
        assert!(!bid.credential.is_empty());
    }

    #[tokio::test]
    async fn submission_without_registered_wallet_is_rejected() {
        let (server, _) = server_with_wallet("u1").await;
        let err = server
            .validate_bid(&submission("stranger", "0.5", "0.25"))
            .await
            .expect_err("unknown user must fail");
        assert!(matches!(err, AppError::Validation { field, .. } if field == "userId"));
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected_individually() {
        let (server, _) = server_with_wallet("u1").await;
        let err = server
            .validate_bid(&submission("u1", "0.5", "0"))
            .await
            .expect_err("zero bribe must fail");
        assert!(matches!(err, AppError::Validation { field, .. } if field == "bribeAmount"));

        let err = server
            .validate_bid(&submission("u1", "-1", "0.25"))
            .await
            .expect_err("negative swap must fail");
        assert!(matches!(err, AppError::Validation { field, .. } if field == "swapAmount"));
    }

    #[tokio::test]
    async fn claimed_wallet_must_match_the_registered_one() {
        let (server, _) = server_with_wallet("u1").await;
        let mut bad = submission("u1", "0.5", "0.25");
        bad.wallet_address = Some(format!("{:#x}", Address::from([0x09; 20])));

        let err = server
            .validate_bid(&bad)
            .await
            .expect_err("mismatched wallet must fail");
        assert!(matches!(err, AppError::Validation { field, .. } if field == "walletAddress"));
    }

    #[tokio::test]
    async fn malformed_token_address_is_rejected() {
        let (server, _) = server_with_wallet("u1").await;
        let mut bad = submission("u1", "0.5", "0.25");
        bad.token_address = "0xnot-an-address".to_string();

        let err = server
            .validate_bid(&bad)
            .await
            .expect_err("bad token must fail");
        assert!(matches!(err, AppError::Validation { field, .. } if field == "tokenAddress"));
    }

    #[tokio::test]
    async fn bearer_token_must_match_exactly() {
        let (server, _) = server_with_wallet("u1").await;
        assert!(server.authorized(Some("Bearer secret")));
        assert!(!server.authorized(Some("Bearer wrong")));
        assert!(!server.authorized(Some("secret")));
        assert!(!server.authorized(None));
    }
}
