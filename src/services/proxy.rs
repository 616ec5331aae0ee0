// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::types::LiquidityAddEvent;
use crate::services::classifier::{Classification, Classifier};
use crate::services::http1::{read_request, write_response_with_headers, write_text};
use crate::services::ingest::NotifyClient;
use crate::services::pipeline::PipelineStats;
use crate::services::recovery;
use alloy::consensus::Transaction as ConsensusTx;
use alloy::primitives::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::Ordering::Relaxed;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const FORWARD_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    #[allow(dead_code)]
    id: Option<serde_json::Value>,
    method: String,
    #[serde(default)]
    params: serde_json::Value,
}

/// Where detections go: the in-process pipeline queue, or a remote bid API
/// when the pipeline runs in another process.
pub enum DetectionSink {
    Local(mpsc::Sender<LiquidityAddEvent>),
    Remote(NotifyClient),
}

impl DetectionSink {
    /// Hand off a detection without blocking the forward path: local events
    /// go through the bounded queue's non-blocking send, remote notification
    /// runs in its own task.
    fn dispatch(&self, event: LiquidityAddEvent) {
        match self {
            DetectionSink::Local(sender) => {
                if let Err(e) = sender.try_send(event) {
                    tracing::warn!(target: "proxy", error = %e, "Event queue full, detection dropped");
                }
            }
            DetectionSink::Remote(client) => {
                let client = client.clone();
                tokio::spawn(async move {
                    if let Err(e) = client.notify_lp_add(&event).await {
                        tracing::warn!(target: "proxy", error = %e, "LP-add notification failed");
                    }
                });
            }
        }
    }
}

/// JSON-RPC ingress. Every request is classified and forwarded
/// synchronously; a match additionally hands an event to the auction
/// pipeline without ever blocking the forward path.
pub struct ProxyServer {
    upstream_url: String,
    sequencer_url: String,
    classifier: Classifier,
    sink: DetectionSink,
    stats: Arc<PipelineStats>,
    client: reqwest::Client,
}

impl ProxyServer {
    pub fn new(
        upstream_url: String,
        sequencer_url: String,
        classifier: Classifier,
        sink: DetectionSink,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            upstream_url,
            sequencer_url,
            classifier,
            sink,
            stats,
            client: reqwest::Client::new(),
        }
    }

    pub async fn run(
        self: Arc<Self>,
        port: u16,
        shutdown: CancellationToken,
    ) -> Result<(), crate::domain::error::AppError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await.map_err(|e| {
            crate::domain::error::AppError::Initialization(format!(
                "Proxy failed to bind port {port}: {e}"
            ))
        })?;
        tracing::info!(target: "proxy", port, "RPC proxy listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "proxy", "Proxy shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let server = self.clone();
                            tokio::spawn(async move { server.handle_connection(stream).await });
                        }
                        Err(e) => {
                            tracing::warn!(target: "proxy", error = %e, "Accept failed");
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
                tracing::debug!(target: "proxy", error = %e, "Unreadable request");
                write_text(&mut stream, "400 Bad Request", "Failed to read request body").await;
                return;
            }
        };

        if request.method != "POST" {
            write_text(&mut stream, "405 Method Not Allowed", "Method not allowed").await;
            return;
        }

        let parsed: RpcRequest = match serde_json::from_slice(&request.body) {
            Ok(parsed) => parsed,
            Err(_) => {
                write_text(&mut stream, "400 Bad Request", "Invalid request").await;
                return;
            }
        };

        if parsed.method != "eth_sendRawTransaction" {
            self.forward(&mut stream, &request.body, &self.upstream_url)
                .await;
            return;
        }

        let params: Vec<String> = match serde_json::from_value(parsed.params) {
            Ok(params) => params,
            Err(_) => {
                write_text(&mut stream, "400 Bad Request", "Invalid transaction parameters").await;
                return;
            }
        };
        let Some(tx_hex) = params.first() else {
            write_text(&mut stream, "400 Bad Request", "Missing transaction data").await;
            return;
        };

        let Some(raw) = crate::common::parsing::parse_hex_bytes(tx_hex) else {
            write_text(&mut stream, "400 Bad Request", "Invalid transaction hex").await;
            return;
        };
        let envelope = match recovery::decode_raw_transaction(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(target: "proxy", error = %e, "Rejecting undecodable raw transaction");
                write_text(&mut stream, "400 Bad Request", "Invalid transaction data").await;
                return;
            }
        };

        self.inspect(&envelope, Bytes::from(raw));

        // Raw transactions go to the sequencer endpoint, everything else to
        // the general upstream.
        self.forward(&mut stream, &request.body, &self.sequencer_url)
            .await;
    }

    /// Classification and recovery never gate forwarding: any error here is
    /// logged and swallowed.
    fn inspect(&self, envelope: &alloy::consensus::TxEnvelope, raw: Bytes) {
        match self
            .classifier
            .classify(envelope.to(), envelope.input().as_ref())
        {
            Classification::AddLiquidityNative {
                token,
                amount_desired,
                deadline,
            } => {
                let creator = match recovery::recover_sender(envelope) {
                    Ok(recovered) => recovered.address,
                    Err(e) => {
                        tracing::warn!(
                            target: "proxy",
                            token = %token,
                            error = %e,
                            "Sender recovery failed, dropping detection"
                        );
                        return;
                    }
                };
                tracing::info!(
                    target: "proxy",
                    token = %token,
                    creator = %creator,
                    amount_desired = %amount_desired,
                    tx = %envelope.tx_hash(),
                    "Liquidity-add transaction detected"
                );
                self.stats.detections.fetch_add(1, Relaxed);

                let event = LiquidityAddEvent {
                    token,
                    creator,
                    raw_tx: raw,
                    call_deadline: Some(deadline),
                };
                self.sink.dispatch(event);
            }
            Classification::CreatePair { token_a, token_b } => {
                tracing::info!(
                    target: "proxy",
                    token_a = %token_a,
                    token_b = %token_b,
                    tx = %envelope.tx_hash(),
                    "Pair creation observed"
                );
            }
            Classification::None => {}
        }
    }

    async fn forward(&self, stream: &mut TcpStream, body: &[u8], url: &str) {
        self.stats.forwarded.fetch_add(1, Relaxed);
        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.to_vec())
            .timeout(std::time::Duration::from_millis(FORWARD_TIMEOUT_MS))
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(target: "proxy", url = %url, error = %e, "Upstream forward failed");
                write_text(
                    stream,
                    "500 Internal Server Error",
                    "Failed to forward request",
                )
                .await;
                return;
            }
        };

        // Mirror the upstream status and headers byte-for-byte; only the
        // connection framing is replaced.
        let status = resp.status();
        let headers: Vec<(String, String)> = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await.unwrap_or_default();

        let status_line = format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        );
        let header_refs: Vec<(&str, &str)> = headers
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect();
        write_response_with_headers(stream, status_line.trim_end(), &header_refs, &body).await;
    }
}
