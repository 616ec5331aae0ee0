// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::providers::Provider;
use clap::Parser;
use oxidity_gateway::app::config::GlobalSettings;
use oxidity_gateway::app::logging::setup_logging;
use oxidity_gateway::domain::error::AppError;
use oxidity_gateway::infrastructure::data::db::Database;
use oxidity_gateway::infrastructure::network::gas::GasOracle;
use oxidity_gateway::infrastructure::network::nonce::NonceFetcher;
use oxidity_gateway::infrastructure::network::provider::ConnectionFactory;
use oxidity_gateway::services::bundle::BundleBuilder;
use oxidity_gateway::services::classifier::Classifier;
use oxidity_gateway::services::ingest::{IngestServer, NotifyClient};
use oxidity_gateway::services::ledger::BidLedger;
use oxidity_gateway::services::metrics::spawn_metrics_server;
use oxidity_gateway::services::pipeline::{Pipeline, PipelineStats};
use oxidity_gateway::services::proxy::{DetectionSink, ProxyServer};
use oxidity_gateway::services::submitter::BundleSender;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "oxidity gateway")]
struct Cli {
    /// Path to config file (default: config.{toml,yaml,...})
    #[arg(long)]
    config: Option<String>,

    /// Do not submit bundle transactions, only construct/log
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Proxy listen port (overrides config/env)
    #[arg(long)]
    proxy_port: Option<u16>,

    /// Bid API listen port (overrides config/env)
    #[arg(long)]
    api_port: Option<u16>,

    /// Metrics port (overrides config/env)
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let settings = GlobalSettings::load_with_path(cli.config.as_deref())?;
    setup_logging(if settings.debug { "debug" } else { "info" }, false);

    let provider = ConnectionFactory::http(&settings.upstream_rpc_url)?;
    let reported_chain: u64 = provider
        .get_chain_id()
        .await
        .map_err(|e| AppError::Connection(format!("Upstream unreachable at startup: {e}")))?;
    if reported_chain != settings.chain_id {
        return Err(AppError::Config(format!(
            "chain_id {} does not match upstream chain {}",
            settings.chain_id, reported_chain
        )));
    }
    tracing::info!(
        chain_id = settings.chain_id,
        upstream = %settings.upstream_rpc_url,
        sequencer = %settings.sequencer_url(),
        "Upstream verified"
    );

    let db = Database::new(&settings.database_url()).await?;
    let ledger = Arc::new(BidLedger::new());
    let stats = Arc::new(PipelineStats::default());
    let classifier = Classifier::new(settings.router_address, settings.factory_address);

    let (event_tx, event_rx) = mpsc::channel(settings.event_queue_depth_value());
    let shutdown = CancellationToken::new();

    let gas = GasOracle::new(
        provider.clone(),
        settings.priority_fee_wei(),
        settings.max_fee_wei(),
    );
    let builder = BundleBuilder::new(
        settings.sniper_contract,
        settings.chain_id,
        settings.fee_mode,
        settings.snipe_gas_limit_value(),
        settings.fee_step(),
        settings.min_fee_wei(),
        settings.snipe_deadline(),
        NonceFetcher::new(provider.clone()),
    );
    let sender = BundleSender::new(settings.sequencer_url(), cli.dry_run);
    if cli.dry_run {
        tracing::warn!("Dry-run mode: bundles are constructed but not submitted");
    }

    let pipeline = Arc::new(Pipeline::new(
        ledger.clone(),
        db.clone(),
        gas,
        builder,
        sender,
        stats.clone(),
    ));
    let pipeline_task = tokio::spawn(pipeline.run(event_rx, shutdown.clone()));

    let api_port = cli.api_port.unwrap_or(settings.api_port);
    let ingest = Arc::new(IngestServer::new(
        settings.auth_token.clone(),
        db.clone(),
        ledger.clone(),
        classifier.clone(),
        event_tx.clone(),
    ));
    let mut ingest_task = tokio::spawn(ingest.run(api_port, shutdown.clone()));

    let metrics_port = cli.metrics_port.unwrap_or(settings.metrics_port);
    spawn_metrics_server(metrics_port, stats.clone()).await;

    let sink = match &settings.notify_url {
        Some(url) => {
            tracing::info!(notify_url = %url, "Forwarding detections to remote bid API");
            DetectionSink::Remote(NotifyClient::new(url.clone(), settings.auth_token.clone()))
        }
        None => DetectionSink::Local(event_tx.clone()),
    };
    let proxy_port = cli.proxy_port.unwrap_or(settings.proxy_port);
    let proxy = Arc::new(ProxyServer::new(
        settings.upstream_rpc_url.clone(),
        settings.sequencer_url(),
        classifier,
        sink,
        stats.clone(),
    ));
    let mut proxy_task = tokio::spawn(proxy.run(proxy_port, shutdown.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
        res = &mut proxy_task => {
            shutdown.cancel();
            return res.map_err(|e| AppError::Initialization(format!("Proxy task join failed: {e}")))?;
        }
        res = &mut ingest_task => {
            shutdown.cancel();
            return res.map_err(|e| AppError::Initialization(format!("Bid API task join failed: {e}")))?;
        }
    }

    let _ = proxy_task.await;
    let _ = ingest_task.await;
    let _ = pipeline_task.await;
    Ok(())
}
