//! Failover integration tests against mock upstream nodes.
//!
//! Each test stands up real HTTP mock nodes, builds a dispatcher over
//! them, and drives full dispatches to verify routing, failover order,
//! backoff recording, and pool restrictions.

use crate::mock_infrastructure::MockNode;
use conduit_core::{
    analytics::Analytics,
    dispatch::{default_http_client, Dispatch, DispatchError, Dispatcher, NodeError},
    health::HealthTracker,
    registry::NodeRegistry,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

struct Harness {
    dispatcher: Dispatcher,
    health: Arc<Mutex<HealthTracker>>,
    analytics: Arc<Analytics>,
}

fn build_harness(private_url: String, public_urls: Vec<String>) -> Harness {
    build_harness_with_timeout(private_url, public_urls, Duration::from_secs(5))
}

fn build_harness_with_timeout(
    private_url: String,
    public_urls: Vec<String>,
    attempt_timeout: Duration,
) -> Harness {
    let registry = Arc::new(NodeRegistry::new(&private_url, &public_urls));
    let health = Arc::new(Mutex::new(HealthTracker::new(registry.len())));
    let analytics = Arc::new(Analytics::new(registry.len()));
    let client = default_http_client().unwrap();

    let dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&health),
        Arc::clone(&analytics),
        client,
        attempt_timeout,
    );
    Harness { dispatcher, health, analytics }
}

/// A node that accepts connections but never answers, so every attempt
/// against it runs into the per-attempt timeout.
async fn unresponsive_node() -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            if let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        }
    });
    (format!("http://{addr}"), handle)
}

fn read_request(method: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": []})
}

#[tokio::test]
async fn test_rate_limited_private_fails_over_to_public() {
    let mut private = MockNode::start().await;
    let mut public = MockNode::start().await;

    let private_mock = private.mock_rate_limited();
    let public_mock = public.mock_any_result(&json!("0x64"));

    let harness = build_harness(private.url(), vec![public.url()]);
    let response = harness.dispatcher.dispatch(read_request("eth_blockNumber")).await.unwrap();

    // The caller sees the public node's payload; the 429 never surfaces.
    assert_eq!(response["result"], "0x64");
    private_mock.assert();
    public_mock.assert();

    // The private node took a failure and is now backing off.
    let health = harness.health.lock();
    assert_eq!(health.failures(0), 1);
    assert!(!health.is_healthy(0, Instant::now()));
    assert_eq!(
        harness.analytics.node(0).rate_limits.load(std::sync::atomic::Ordering::Relaxed),
        1
    );
    assert_eq!(
        harness.analytics.node(1).successes.load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn test_wallet_method_never_reaches_private_node() {
    let mut private = MockNode::start().await;
    let mut public = MockNode::start().await;

    let private_mock = private.expect_untouched();
    let public_mock = public.mock_any_result(&json!("0xtxhash"));

    let harness = build_harness(private.url(), vec![public.url()]);
    let response =
        harness.dispatcher.dispatch(read_request("eth_sendTransaction")).await.unwrap();

    assert_eq!(response["result"], "0xtxhash");
    private_mock.assert();
    public_mock.assert();
}

#[tokio::test]
async fn test_all_nodes_failing_yields_unavailable() {
    let mut private = MockNode::start().await;
    let mut public_a = MockNode::start().await;
    let mut public_b = MockNode::start().await;

    private.mock_rate_limited();
    public_a.mock_server_error();
    public_b.mock_server_error();

    let harness = build_harness(private.url(), vec![public_a.url(), public_b.url()]);
    let error =
        harness.dispatcher.dispatch(read_request("eth_call")).await.unwrap_err();

    // The last candidate's failure survives as the terminal cause.
    assert!(matches!(
        error,
        DispatchError::AllNodesUnavailable { source: Some(NodeError::ServerError(500)) }
    ));

    // Every node recorded its own failure class.
    let health = harness.health.lock();
    for id in 0..3 {
        assert_eq!(health.failures(id), 1);
        assert!(!health.is_healthy(id, Instant::now()));
    }
}

#[tokio::test]
async fn test_wallet_dispatch_force_unblocks_first_public_node() {
    let mut private = MockNode::start().await;
    let mut public_a = MockNode::start().await;
    let mut public_b = MockNode::start().await;

    let private_mock = private.expect_untouched();
    let public_a_mock = public_a.mock_any_result(&json!("0xtxhash"));
    let public_b_mock = public_b.expect_untouched();

    let harness = build_harness(private.url(), vec![public_a.url(), public_b.url()]);

    // Poison every public node so the wallet pool has no healthy candidate.
    {
        let mut health = harness.health.lock();
        let now = Instant::now();
        health.record_rate_limited(1, now);
        health.record_rate_limited(2, now);
    }

    let response =
        harness.dispatcher.dispatch(read_request("eth_sendTransaction")).await.unwrap();

    // The first-listed public node was force-unblocked and served the
    // request; the private node stays out of the wallet pool throughout.
    assert_eq!(response["result"], "0xtxhash");
    private_mock.assert();
    public_a_mock.assert();
    public_b_mock.assert();
}

#[tokio::test]
async fn test_client_error_status_is_not_retried() {
    // 404-class rejections indicate a bad payload, not node unhealth, so
    // no other candidate is attempted.
    let mut rejecting = MockNode::start().await;
    let mut fallback = MockNode::start().await;

    let rejecting_mock = rejecting.mock_client_error(404);
    let fallback_mock = fallback.expect_untouched();

    let harness = build_harness(rejecting.url(), vec![fallback.url()]);
    let error = harness.dispatcher.dispatch(read_request("eth_call")).await.unwrap_err();

    assert!(matches!(error, DispatchError::Rejected(404, _)));
    rejecting_mock.assert();
    fallback_mock.assert();

    // No backoff was recorded for a rejection.
    assert_eq!(harness.health.lock().failures(0), 0);
}

#[tokio::test]
async fn test_stalled_node_times_out_and_fails_over() {
    let (stalled_url, listener) = unresponsive_node().await;
    let mut public = MockNode::start().await;
    let public_mock = public.mock_any_result(&json!("0x99"));

    let harness = build_harness_with_timeout(
        stalled_url,
        vec![public.url()],
        Duration::from_millis(300),
    );
    let response = harness.dispatcher.dispatch(read_request("eth_call")).await.unwrap();

    // The stalled node's timeout stays internal; the same inbound call is
    // served by the next candidate.
    assert_eq!(response["result"], "0x99");
    public_mock.assert();

    let health = harness.health.lock();
    assert_eq!(health.failures(0), 1);
    // Flat 3-second timeout penalty was applied, not the exponential one.
    let remaining = health.backoff_remaining(0, Instant::now()).unwrap();
    assert!(remaining <= Duration::from_secs(3));
    assert!(!health.is_healthy(0, Instant::now()));
    assert_eq!(harness.analytics.node(0).timeouts.load(std::sync::atomic::Ordering::Relaxed), 1);

    listener.abort();
}

#[tokio::test]
async fn test_exhaustion_by_timeout_is_classified_as_timeout() {
    let (stalled_url, listener) = unresponsive_node().await;

    let harness =
        build_harness_with_timeout(stalled_url, vec![], Duration::from_millis(300));
    let error = harness.dispatcher.dispatch(read_request("eth_call")).await.unwrap_err();

    // The endpoint keys its log suppression off this classification.
    assert!(error.is_timeout());
    assert!(matches!(
        error,
        DispatchError::AllNodesUnavailable { source: Some(NodeError::Timeout) }
    ));

    listener.abort();
}

#[tokio::test]
async fn test_dispatch_counts_methods() {
    let mut private = MockNode::start().await;
    private.mock_any_result(&json!("0x1"));

    let harness = build_harness(private.url(), vec![]);
    harness.dispatcher.dispatch(read_request("eth_chainId")).await.unwrap();
    harness.dispatcher.dispatch(read_request("eth_chainId")).await.unwrap();
    harness.dispatcher.dispatch(read_request("eth_blockNumber")).await.unwrap();

    let top = harness.analytics.top_methods(5);
    assert_eq!(top[0], ("eth_chainId".to_string(), 2));
    assert_eq!(top[1], ("eth_blockNumber".to_string(), 1));
}
