//! Per-node failure and backoff bookkeeping.
//!
//! [`HealthTracker`] is plain mutable state with no I/O of its own. Every
//! operation takes an explicit `now` so tests can drive time directly. The
//! dispatcher is the only writer (dispatches are serialized by the queue);
//! the analytics reporter reads concurrently, which is why callers share
//! the tracker behind a mutex rather than the tracker locking internally.

use crate::registry::NodeId;
use std::time::{Duration, Instant};

/// Exponent cap for the rate-limit backoff: at most `2^6 = 64` seconds.
const RATE_LIMIT_BACKOFF_CAP_EXP: u32 = 6;

/// Flat penalty for HTTP 5xx responses. Server errors are treated as less
/// indicative of sustained unhealth than rate limiting.
const SERVER_ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// Flat penalty for per-attempt timeouts.
const TIMEOUT_BACKOFF: Duration = Duration::from_secs(3);

/// Mutable health state for one upstream node.
#[derive(Debug, Clone, Default)]
pub struct NodeHealth {
    /// Consecutive-ish failure counter: incremented on any failure,
    /// decremented by one (floor zero) on success. The gradual decrement
    /// avoids instantly trusting a node after one lucky call.
    failures: u32,
    /// Most recent failure time. Diagnostic only.
    last_failure: Option<Instant>,
    /// The node is skipped until this instant passes.
    backoff_until: Option<Instant>,
}

/// Health table for the whole registry, indexed by [`NodeId`].
#[derive(Debug)]
pub struct HealthTracker {
    nodes: Vec<NodeHealth>,
}

impl HealthTracker {
    /// Creates a tracker with one healthy record per registered node.
    #[must_use]
    pub fn new(node_count: usize) -> Self {
        Self { nodes: vec![NodeHealth::default(); node_count] }
    }

    /// A node is healthy iff its backoff window has passed.
    #[must_use]
    pub fn is_healthy(&self, id: NodeId, now: Instant) -> bool {
        self.nodes[id].backoff_until.is_none_or(|until| now >= until)
    }

    /// Current failure count for a node.
    #[must_use]
    pub fn failures(&self, id: NodeId) -> u32 {
        self.nodes[id].failures
    }

    /// Remaining backoff window, if the node is currently backed off.
    #[must_use]
    pub fn backoff_remaining(&self, id: NodeId, now: Instant) -> Option<Duration> {
        self.nodes[id]
            .backoff_until
            .and_then(|until| until.checked_duration_since(now))
            .filter(|remaining| !remaining.is_zero())
    }

    /// Records a successful call: one unit of health recovered.
    pub fn record_success(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        node.failures = node.failures.saturating_sub(1);
    }

    /// Records an HTTP 429: exponential backoff keyed off the
    /// post-increment failure count, capped at 64 seconds.
    pub fn record_rate_limited(&mut self, id: NodeId, now: Instant) {
        let node = &mut self.nodes[id];
        node.failures = node.failures.saturating_add(1);
        node.last_failure = Some(now);
        let exp = node.failures.min(RATE_LIMIT_BACKOFF_CAP_EXP);
        node.backoff_until = Some(now + Duration::from_secs(1 << exp));
    }

    /// Records an HTTP 5xx: flat 2-second penalty.
    pub fn record_server_error(&mut self, id: NodeId, now: Instant) {
        let node = &mut self.nodes[id];
        node.failures = node.failures.saturating_add(1);
        node.last_failure = Some(now);
        node.backoff_until = Some(now + SERVER_ERROR_BACKOFF);
    }

    /// Records a timed-out attempt: flat 3-second penalty.
    pub fn record_timeout(&mut self, id: NodeId, now: Instant) {
        let node = &mut self.nodes[id];
        node.failures = node.failures.saturating_add(1);
        node.last_failure = Some(now);
        node.backoff_until = Some(now + TIMEOUT_BACKOFF);
    }

    /// Clears a node's backoff and failure count.
    ///
    /// Forward-progress fallback: when every candidate in a pool is backed
    /// off, the dispatcher force-unblocks exactly one node so a request can
    /// never deadlock against a fully penalized pool.
    pub fn force_unblock(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        node.failures = 0;
        node.backoff_until = None;
    }
}
