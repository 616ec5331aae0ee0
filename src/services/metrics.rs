// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::services::pipeline::PipelineStats;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub async fn spawn_metrics_server(port: u16, stats: Arc<PipelineStats>) -> Option<SocketAddr> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!("Metrics server failed to bind: {}", e);
            return None;
        }
    };

    let local = listener.local_addr().ok();
    if let Some(addr) = local {
        tracing::info!("Metrics server listening on {}", addr);
    }

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await.unwrap_or(0);

                    let body = render_metrics(&stats);
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                }
                Err(e) => {
                    tracing::warn!("Metrics accept error: {}", e);
                    continue;
                }
            }
        }
    });

    local
}

fn render_metrics(stats: &Arc<PipelineStats>) -> String {
    use std::sync::atomic::Ordering::Relaxed;
    format!(
        concat!(
            "# TYPE gateway_requests_forwarded counter\ngateway_requests_forwarded {}\n",
            "# TYPE gateway_liquidity_adds_detected counter\ngateway_liquidity_adds_detected {}\n",
            "# TYPE gateway_auctions_run counter\ngateway_auctions_run {}\n",
            "# TYPE gateway_bids_dropped counter\ngateway_bids_dropped {}\n",
            "# TYPE gateway_bundle_txs_submitted counter\ngateway_bundle_txs_submitted {}\n",
            "# TYPE gateway_bundle_txs_failed counter\ngateway_bundle_txs_failed {}\n"
        ),
        stats.forwarded.load(Relaxed),
        stats.detections.load(Relaxed),
        stats.auctions.load(Relaxed),
        stats.bids_dropped.load(Relaxed),
        stats.submitted.load(Relaxed),
        stats.failed.load(Relaxed),
    )
}
