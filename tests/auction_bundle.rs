// SPDX-License-Identifier: MIT
// Integration-ish coverage for the auction → bundle → submit path. A tiny
// in-process JSON-RPC stub stands in for the sequencer so nonce fetches and
// raw submissions run end to end without a chain.

use alloy::consensus::{SignableTransaction, TxEip1559};
use alloy::eips::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use oxidity_gateway::common::time::current_unix;
use oxidity_gateway::domain::types::{
    Bundle, BundleTransaction, FeeMode, LiquidityAddEvent, SnipeBid, SnipeTx, SubmitStatus,
};
use oxidity_gateway::infrastructure::network::gas::StartingFees;
use oxidity_gateway::infrastructure::network::nonce::NonceFetcher;
use oxidity_gateway::infrastructure::network::provider::HttpProvider;
use oxidity_gateway::infrastructure::data::db::Database;
use oxidity_gateway::infrastructure::network::gas::GasOracle;
use oxidity_gateway::services::auction;
use oxidity_gateway::services::bundle::BundleBuilder;
use oxidity_gateway::services::ledger::BidLedger;
use oxidity_gateway::services::pipeline::{Pipeline, PipelineStats};
use oxidity_gateway::services::submitter::BundleSender;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering::Relaxed;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

const GWEI: u128 = 1_000_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StubMode {
    AcceptAll,
    RejectSends,
    SendsAlreadyKnown,
}

async fn spawn_stub_rpc(mode: StubMode) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(serve_connection(socket, mode));
        }
    });
    addr
}

async fn serve_connection(mut socket: TcpStream, mode: StubMode) {
    loop {
        let Some(body) = read_body(&mut socket).await else {
            return;
        };
        let Ok(request) = serde_json::from_slice::<serde_json::Value>(&body) else {
            return;
        };
        let id = request.get("id").cloned().unwrap_or(serde_json::json!(1));
        let method = request
            .get("method")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();

        let response = match (method.as_str(), mode) {
            ("eth_getTransactionCount", _) => {
                serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": "0x5" })
            }
            ("eth_sendRawTransaction", StubMode::AcceptAll) => serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": format!("0x{}", "11".repeat(32)),
            }),
            ("eth_sendRawTransaction", StubMode::RejectSends) => serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32000, "message": "nonce too low" },
            }),
            ("eth_sendRawTransaction", StubMode::SendsAlreadyKnown) => serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32000, "message": "already known" },
            }),
            _ => serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": "method not found" },
            }),
        };

        let payload = response.to_string();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
            payload.len()
        );
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        if socket.write_all(payload.as_bytes()).await.is_err() {
            return;
        }
    }
}

async fn read_body(socket: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length: usize = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())?
        })
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    Some(body)
}

fn provider_for(addr: SocketAddr) -> HttpProvider {
    HttpProvider::new_http(Url::parse(&format!("http://{addr}")).expect("stub url"))
}

fn builder_for(addr: SocketAddr, mode: FeeMode) -> BundleBuilder {
    BundleBuilder::new(
        Address::from([0x05; 20]),
        8453,
        mode,
        300_000,
        GWEI,
        GWEI,
        Duration::from_secs(300),
        NonceFetcher::new(provider_for(addr)),
    )
}

fn lead_event(token: Address) -> LiquidityAddEvent {
    // Real signed liquidity-add carrying a 10 gwei fee cap, used as the
    // ladder anchor.
    let creator_key = PrivateKeySigner::random();
    let mut tx = TxEip1559 {
        chain_id: 8453,
        nonce: 1,
        max_priority_fee_per_gas: GWEI,
        max_fee_per_gas: 10 * GWEI,
        gas_limit: 400_000,
        to: TxKind::Call(Address::from([0x41; 20])),
        value: U256::from(1_000_000_000_000_000_000u128),
        input: Bytes::from(vec![0xf3, 0x05, 0xd7, 0x19]),
        ..Default::default()
    };
    let sig = creator_key.sign_transaction_sync(&mut tx).expect("sign lead");
    let envelope: alloy::consensus::TxEnvelope = tx.into_signed(sig).into();

    LiquidityAddEvent {
        token,
        creator: creator_key.address(),
        raw_tx: Bytes::from(envelope.encoded_2718()),
        call_deadline: Some(current_unix() + 600),
    }
}

fn bid_with_signer(user: &str, token: Address, bribe_wei: u128) -> SnipeBid {
    let signer = PrivateKeySigner::random();
    SnipeBid {
        user_id: user.to_string(),
        token,
        swap_amount: U256::from(1_000_000_000_000_000u128),
        bribe_amount: U256::from(bribe_wei),
        wallet: signer.address(),
        credential: hex::encode(signer.credential().to_bytes()),
    }
}

fn starting_fees() -> StartingFees {
    StartingFees {
        max_fee_per_gas: 20 * GWEI,
        max_priority_fee_per_gas: GWEI,
        base_fee_per_gas: 5 * GWEI,
    }
}

fn snipe_fees(bundle: &Bundle) -> Vec<u128> {
    bundle
        .transactions
        .iter()
        .filter_map(|entry| match entry {
            BundleTransaction::Snipe { tx, .. } => Some(tx.effective_fee()),
            BundleTransaction::Lead { .. } => None,
        })
        .collect()
}

#[tokio::test]
async fn bundle_fee_ladder_follows_auction_order() {
    let stub = spawn_stub_rpc(StubMode::AcceptAll).await;
    let token = Address::from([0xaa; 20]);

    // 0.3, 0.1, 0.2 ETH bribes submitted in that order.
    let bids = vec![
        bid_with_signer("a", token, 300_000_000_000_000_000),
        bid_with_signer("b", token, 100_000_000_000_000_000),
        bid_with_signer("c", token, 200_000_000_000_000_000),
    ];
    let ordered = auction::resolve(bids);
    let users: Vec<&str> = ordered.iter().map(|b| b.user_id.as_str()).collect();
    assert_eq!(users, vec!["a", "c", "b"]);

    let event = lead_event(token);
    let bundle = builder_for(stub, FeeMode::FeeMarket)
        .build(&event, ordered, starting_fees())
        .await;

    assert_eq!(bundle.transactions.len(), 4);
    match &bundle.transactions[0] {
        BundleTransaction::Lead { raw } => assert_eq!(raw, &event.raw_tx),
        other => panic!("position 0 must be the lead transaction, got {other:?}"),
    }

    // Anchor 10 gwei, step 1 gwei: snipes price at 9, 8, 7 gwei.
    assert_eq!(snipe_fees(&bundle), vec![9 * GWEI, 8 * GWEI, 7 * GWEI]);

    for entry in &bundle.transactions[1..] {
        let BundleTransaction::Snipe { tx, .. } = entry else {
            panic!("expected snipe position");
        };
        assert_eq!(tx.nonce(), 5, "nonce must come from the bidder's wallet");
    }
}

#[tokio::test]
async fn bid_construction_failure_skips_only_that_bid() {
    let stub = spawn_stub_rpc(StubMode::AcceptAll).await;
    let token = Address::from([0xbb; 20]);

    let mut poisoned = bid_with_signer("middle", token, 200_000_000_000_000_000);
    poisoned.swap_amount = U256::MAX; // swap+bribe overflows, construction fails
    let bids = vec![
        bid_with_signer("top", token, 300_000_000_000_000_000),
        poisoned,
        bid_with_signer("bottom", token, 100_000_000_000_000_000),
    ];

    let event = lead_event(token);
    let bundle = builder_for(stub, FeeMode::FeeMarket)
        .build(&event, auction::resolve(bids), starting_fees())
        .await;

    // N-1 snipes, and the survivors keep their ladder fees.
    assert_eq!(bundle.sniper_count(), 2);
    assert_eq!(snipe_fees(&bundle), vec![9 * GWEI, 7 * GWEI]);
}

#[tokio::test]
async fn legacy_mode_decrements_gas_price_instead_of_fee_cap() {
    let stub = spawn_stub_rpc(StubMode::AcceptAll).await;
    let token = Address::from([0xcc; 20]);
    let bids = vec![bid_with_signer("only", token, 50_000_000_000_000_000)];

    let event = lead_event(token);
    let bundle = builder_for(stub, FeeMode::Legacy)
        .build(&event, auction::resolve(bids), starting_fees())
        .await;

    assert_eq!(bundle.sniper_count(), 1);
    match &bundle.transactions[1] {
        BundleTransaction::Snipe {
            tx: SnipeTx::Legacy(tx),
            ..
        } => {
            assert_eq!(tx.gas_price, 9 * GWEI);
            assert_eq!(tx.chain_id, Some(8453));
        }
        other => panic!("expected legacy snipe, got {other:?}"),
    }
}

#[tokio::test]
async fn submission_covers_every_position_in_order() {
    let stub = spawn_stub_rpc(StubMode::AcceptAll).await;
    let token = Address::from([0xdd; 20]);
    let bids = vec![
        bid_with_signer("a", token, 300_000_000_000_000_000),
        bid_with_signer("b", token, 100_000_000_000_000_000),
    ];

    let event = lead_event(token);
    let bundle = builder_for(stub, FeeMode::FeeMarket)
        .build(&event, auction::resolve(bids), starting_fees())
        .await;

    let sender = BundleSender::new(format!("http://{stub}"), false);
    let outcomes = sender.submit(&bundle).await;

    assert_eq!(outcomes.len(), 3);
    for (position, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.position, position);
        assert_eq!(outcome.status, SubmitStatus::Accepted);
        assert!(outcome.tx_hash.is_some());
    }
}

#[tokio::test]
async fn sequencer_rejection_does_not_halt_later_positions() {
    let build_stub = spawn_stub_rpc(StubMode::AcceptAll).await;
    let submit_stub = spawn_stub_rpc(StubMode::RejectSends).await;
    let token = Address::from([0xee; 20]);
    let bids = vec![
        bid_with_signer("a", token, 300_000_000_000_000_000),
        bid_with_signer("b", token, 100_000_000_000_000_000),
    ];

    let event = lead_event(token);
    let bundle = builder_for(build_stub, FeeMode::FeeMarket)
        .build(&event, auction::resolve(bids), starting_fees())
        .await;

    let sender = BundleSender::new(format!("http://{submit_stub}"), false);
    let outcomes = sender.submit(&bundle).await;

    // Every position was attempted despite each one failing.
    assert_eq!(outcomes.len(), 3);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o.status, SubmitStatus::Failed(_)))
    );
}

#[tokio::test]
async fn lead_already_known_to_sequencer_counts_as_accepted() {
    let build_stub = spawn_stub_rpc(StubMode::AcceptAll).await;
    let submit_stub = spawn_stub_rpc(StubMode::SendsAlreadyKnown).await;
    let token = Address::from([0xef; 20]);
    let bids = vec![bid_with_signer("a", token, 300_000_000_000_000_000)];

    let event = lead_event(token);
    let bundle = builder_for(build_stub, FeeMode::FeeMarket)
        .build(&event, auction::resolve(bids), starting_fees())
        .await;

    let sender = BundleSender::new(format!("http://{submit_stub}"), false);
    let outcomes = sender.submit(&bundle).await;

    // The proxy already forwarded the lead, so a duplicate is the happy path
    // there; the same error on a snipe position is a real failure.
    assert_eq!(outcomes[0].status, SubmitStatus::Accepted);
    assert!(matches!(outcomes[1].status, SubmitStatus::Failed(_)));
}

async fn pipeline_for(stub: SocketAddr, ledger: Arc<BidLedger>, stats: Arc<PipelineStats>) -> Pipeline {
    let db = Database::new("sqlite::memory:").await.expect("db");
    let gas = GasOracle::new(provider_for(stub), GWEI, 20 * GWEI);
    Pipeline::new(
        ledger,
        db,
        gas,
        builder_for(stub, FeeMode::FeeMarket),
        BundleSender::new(format!("http://{stub}"), true),
        stats,
    )
}

#[tokio::test]
async fn zero_bid_detection_is_a_quiet_noop() {
    let stub = spawn_stub_rpc(StubMode::AcceptAll).await;
    let ledger = Arc::new(BidLedger::new());
    let stats = Arc::new(PipelineStats::default());
    let pipeline = pipeline_for(stub, ledger, stats.clone()).await;

    pipeline
        .handle_event(lead_event(Address::from([0x77; 20])))
        .await;

    assert_eq!(stats.auctions.load(Relaxed), 0);
    assert_eq!(stats.submitted.load(Relaxed), 0);
    assert_eq!(stats.failed.load(Relaxed), 0);
}

#[tokio::test]
async fn duplicate_event_delivery_runs_exactly_one_auction() {
    let stub = spawn_stub_rpc(StubMode::AcceptAll).await;
    let ledger = Arc::new(BidLedger::new());
    let stats = Arc::new(PipelineStats::default());
    let token = Address::from([0x78; 20]);
    ledger.add_bid(bid_with_signer("solo", token, 250_000_000_000_000_000));

    let pipeline = pipeline_for(stub, ledger, stats.clone()).await;
    let event = lead_event(token);

    pipeline.handle_event(event.clone()).await;
    assert_eq!(stats.auctions.load(Relaxed), 1);

    // The second delivery drains an already-empty bucket and stops.
    pipeline.handle_event(event).await;
    assert_eq!(stats.auctions.load(Relaxed), 1);
}
