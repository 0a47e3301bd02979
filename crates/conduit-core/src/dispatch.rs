//! Failure-aware request dispatch across the upstream node pool.
//!
//! One dispatch handles one inbound JSON-RPC envelope: classify the method,
//! select healthy candidates, attempt them in order with a per-attempt
//! timeout, record every outcome against the node that produced it, and
//! short-circuit on the first 2xx payload.

use crate::{
    analytics::Analytics,
    health::HealthTracker,
    registry::{NodeId, NodeRegistry},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    sync::{atomic::Ordering, Arc},
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::warn;

/// Per-attempt timeout for outbound upstream calls.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(8);

/// A transient failure attributable to one node. These never cross the
/// proxy boundary on their own; they advance the dispatcher to the next
/// candidate and only the last one survives into [`DispatchError`].
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("rate limited (429)")]
    RateLimited,

    #[error("server error: HTTP {0}")]
    ServerError(u16),

    #[error("attempt timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

/// Terminal outcome of a dispatch.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Every candidate node failed transiently.
    #[error("all rpc nodes unavailable")]
    AllNodesUnavailable { source: Option<NodeError> },

    /// An upstream rejected the request with a status that indicates a
    /// malformed payload rather than node unhealth. Not retried elsewhere.
    #[error("upstream rejected request: HTTP {0}")]
    Rejected(u16, String),

    /// The queue worker is gone; the process is shutting down.
    #[error("proxy is shutting down")]
    ShuttingDown,
}

impl DispatchError {
    /// True when the terminal cause was a timeout. The endpoint suppresses
    /// error logs for these; timed-out attempts are frequent and expected.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AllNodesUnavailable { source: Some(NodeError::Timeout) })
    }
}

/// The seam between the serial queue and the dispatcher, so queue behavior
/// is testable with a probe implementation.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, body: serde_json::Value) -> Result<serde_json::Value, DispatchError>;
}

/// Builds the shared outbound HTTP client with pooling and TLS settings.
///
/// # Errors
///
/// Returns the underlying builder error if TLS initialization fails.
pub fn default_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(5))
        .use_rustls_tls()
        .tcp_nodelay(true)
        .user_agent("conduit-rpc/0.1.0")
        .build()
}

/// Orders a pool's nodes for attempt: healthy only, fewest failures first,
/// declared pool order on ties (stable sort). When nothing is healthy the
/// pool's first-listed node is force-unblocked so the request can proceed.
fn select_candidates(pool: &[NodeId], health: &mut HealthTracker, now: Instant) -> Vec<NodeId> {
    let mut candidates: Vec<NodeId> =
        pool.iter().copied().filter(|&id| health.is_healthy(id, now)).collect();
    candidates.sort_by_key(|&id| health.failures(id));

    if candidates.is_empty() {
        if let Some(&first) = pool.first() {
            health.force_unblock(first);
            candidates.push(first);
        }
    }
    candidates
}

/// Dispatches JSON-RPC envelopes across the node registry.
///
/// All collaborators are constructor-injected so tests can build isolated
/// instances with their own health tables and counters.
pub struct Dispatcher {
    registry: Arc<NodeRegistry>,
    health: Arc<Mutex<HealthTracker>>,
    analytics: Arc<Analytics>,
    client: reqwest::Client,
    attempt_timeout: Duration,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        registry: Arc<NodeRegistry>,
        health: Arc<Mutex<HealthTracker>>,
        analytics: Arc<Analytics>,
        client: reqwest::Client,
        attempt_timeout: Duration,
    ) -> Self {
        Self { registry, health, analytics, client, attempt_timeout }
    }

    /// One attempt against one node. Classifies the outcome; health and
    /// stats recording stays with the caller.
    async fn attempt(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, AttemptFailure> {
        let response = match self
            .client
            .post(url)
            .json(body)
            .timeout(self.attempt_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(AttemptFailure::Node(NodeError::Timeout)),
            Err(e) => {
                return Err(AttemptFailure::Node(NodeError::Transport(sanitize_transport_error(
                    &e,
                ))))
            }
        };

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AttemptFailure::Node(NodeError::RateLimited));
        }
        if status.is_server_error() {
            return Err(AttemptFailure::Node(NodeError::ServerError(status.as_u16())));
        }
        if !status.is_success() {
            // Malformed-request class: most likely our payload, not the
            // node. Not retried against other nodes.
            let text = response.text().await.unwrap_or_default();
            let truncated = if text.len() > 256 { text[..256].to_string() } else { text };
            return Err(AttemptFailure::Fatal(DispatchError::Rejected(status.as_u16(), truncated)));
        }

        match response.json::<serde_json::Value>().await {
            Ok(payload) => Ok(payload),
            Err(e) => Err(AttemptFailure::Node(NodeError::MalformedBody(e.to_string()))),
        }
    }

    fn record_node_failure(&self, id: NodeId, error: &NodeError, now: Instant) {
        let stats = self.analytics.node(id);
        match error {
            NodeError::RateLimited => {
                stats.rate_limits.fetch_add(1, Ordering::Relaxed);
                stats.failures.fetch_add(1, Ordering::Relaxed);
                self.health.lock().record_rate_limited(id, now);
            }
            NodeError::ServerError(_) => {
                stats.server_errors.fetch_add(1, Ordering::Relaxed);
                stats.failures.fetch_add(1, Ordering::Relaxed);
                self.health.lock().record_server_error(id, now);
            }
            NodeError::Timeout => {
                stats.timeouts.fetch_add(1, Ordering::Relaxed);
                stats.failures.fetch_add(1, Ordering::Relaxed);
                self.health.lock().record_timeout(id, now);
            }
            // Transport hiccups and malformed bodies advance to the next
            // node without a backoff penalty, matching the proxy's original
            // behavior for non-timeout fetch failures.
            NodeError::Transport(_) | NodeError::MalformedBody(_) => {}
        }
    }
}

enum AttemptFailure {
    Node(NodeError),
    Fatal(DispatchError),
}

#[async_trait]
impl Dispatch for Dispatcher {
    async fn dispatch(&self, body: serde_json::Value) -> Result<serde_json::Value, DispatchError> {
        let method =
            body.get("method").and_then(|m| m.as_str()).unwrap_or("unknown").to_string();
        self.analytics.record_method(&method);

        let now = Instant::now();
        let pool = self.registry.candidates_for(&method);
        let candidates = {
            let mut health = self.health.lock();
            select_candidates(pool, &mut health, now)
        };

        let mut last_error: Option<NodeError> = None;

        for id in candidates {
            let url = self.registry.url(id);
            self.analytics.node(id).requests.fetch_add(1, Ordering::Relaxed);

            match self.attempt(url, &body).await {
                Ok(payload) => {
                    self.analytics.node(id).successes.fetch_add(1, Ordering::Relaxed);
                    self.health.lock().record_success(id);
                    return Ok(payload);
                }
                Err(AttemptFailure::Fatal(error)) => return Err(error),
                Err(AttemptFailure::Node(error)) => {
                    self.record_node_failure(id, &error, now);
                    match &error {
                        NodeError::RateLimited => {
                            warn!(node = url, method = %method, "node rate limited (429)");
                        }
                        NodeError::ServerError(status) => {
                            warn!(node = url, method = %method, status = status, "node server error");
                        }
                        // Timeouts are frequent and expected; kept out of
                        // the warn stream deliberately.
                        NodeError::Timeout
                        | NodeError::Transport(_)
                        | NodeError::MalformedBody(_) => {}
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(DispatchError::AllNodesUnavailable { source: last_error })
    }
}

/// Collapses reqwest errors to coarse categories so upstream connection
/// details never leak into responses or logs verbatim.
fn sanitize_transport_error(error: &reqwest::Error) -> String {
    if error.is_connect() {
        "connection refused or unreachable".to_string()
    } else if error.is_request() {
        "request failed".to_string()
    } else if error.is_body() || error.is_decode() {
        "response body error".to_string()
    } else {
        "network error".to_string()
    }
}
