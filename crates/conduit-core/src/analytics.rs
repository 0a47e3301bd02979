//! Request analytics: inline counters plus a periodic log reporter.
//!
//! Purely observational. Nothing here is consulted for routing decisions,
//! and recording can never fail or block the request path: totals and
//! per-node stats are atomics, the method map takes a short write lock.

use crate::{
    health::HealthTracker,
    registry::{NodeId, NodeRegistry},
};
use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use std::{
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::broadcast;
use tracing::info;

/// Monotonic per-node outcome counters. Reset only on process restart.
#[derive(Debug, Default)]
pub struct NodeStats {
    pub requests: AtomicU64,
    pub successes: AtomicU64,
    pub failures: AtomicU64,
    pub rate_limits: AtomicU64,
    pub server_errors: AtomicU64,
    pub timeouts: AtomicU64,
}

impl NodeStats {
    /// Success rate in percent, zero when the node has seen no requests.
    #[must_use]
    pub fn success_rate(&self) -> u64 {
        let requests = self.requests.load(Ordering::Relaxed);
        if requests == 0 {
            return 0;
        }
        self.successes.load(Ordering::Relaxed) * 100 / requests
    }
}

/// Process-wide request counters.
#[derive(Debug)]
pub struct Analytics {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    /// Gauge: incremented on enqueue, decremented on settlement.
    queued_requests: AtomicI64,
    method_counts: RwLock<AHashMap<String, u64>>,
    node_stats: Vec<NodeStats>,
    start_time: Instant,
}

impl Analytics {
    /// Creates counters sized for `node_count` nodes.
    #[must_use]
    pub fn new(node_count: usize) -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            queued_requests: AtomicI64::new(0),
            method_counts: RwLock::new(AHashMap::new()),
            node_stats: (0..node_count).map(|_| NodeStats::default()).collect(),
            start_time: Instant::now(),
        }
    }

    /// Per-node counters for one node id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &NodeStats {
        &self.node_stats[id]
    }

    /// Records an inbound request being admitted to the queue.
    pub fn record_enqueued(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.queued_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a queued request settling, successfully or not.
    pub fn record_settled(&self, success: bool) {
        self.queued_requests.fetch_sub(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Counts a dispatched method by name.
    pub fn record_method(&self, method: &str) {
        let mut counts = self.method_counts.write();
        *counts.entry(method.to_string()).or_insert(0) += 1;
    }

    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn successful_requests(&self) -> u64 {
        self.successful_requests.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failed_requests(&self) -> u64 {
        self.failed_requests.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn queued_requests(&self) -> i64 {
        self.queued_requests.load(Ordering::Relaxed)
    }

    /// The `limit` most-requested methods, descending by count.
    #[must_use]
    pub fn top_methods(&self, limit: usize) -> Vec<(String, u64)> {
        let counts = self.method_counts.read();
        let mut entries: Vec<(String, u64)> =
            counts.iter().map(|(method, count)| (method.clone(), *count)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(limit);
        entries
    }

    /// Seconds since the analytics were initialized.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Requests per minute over the process lifetime, zero at startup.
    #[must_use]
    pub fn requests_per_minute(&self) -> u64 {
        let uptime_secs = self.uptime().as_secs();
        if uptime_secs == 0 {
            return 0;
        }
        self.total_requests() * 60 / uptime_secs
    }
}

/// Periodically summarizes [`Analytics`] and node health to the log.
///
/// Owned by the process lifecycle: started after boot, stopped via the
/// shutdown broadcast so tests can tear it down cleanly.
pub struct AnalyticsReporter {
    analytics: Arc<Analytics>,
    health: Arc<Mutex<HealthTracker>>,
    registry: Arc<NodeRegistry>,
    interval: Duration,
}

impl AnalyticsReporter {
    #[must_use]
    pub fn new(
        analytics: Arc<Analytics>,
        health: Arc<Mutex<HealthTracker>>,
        registry: Arc<NodeRegistry>,
        interval: Duration,
    ) -> Self {
        Self { analytics, health, registry, interval }
    }

    /// Spawns the reporting loop; the task exits on shutdown broadcast.
    #[must_use]
    pub fn start_with_shutdown(
        self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick fires immediately; skip it so the first report
            // covers a full interval.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.report(),
                    _ = shutdown_rx.recv() => {
                        info!("analytics reporter shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Emits one summary. Guarded against zero uptime and zero-request
    /// nodes; reporting must never introduce a failure mode of its own.
    fn report(&self) {
        let analytics = &self.analytics;
        info!(
            uptime_secs = analytics.uptime().as_secs(),
            total_requests = analytics.total_requests(),
            requests_per_minute = analytics.requests_per_minute(),
            successful = analytics.successful_requests(),
            failed = analytics.failed_requests(),
            queued = analytics.queued_requests(),
            "rpc proxy analytics"
        );

        for (method, count) in analytics.top_methods(5) {
            info!(method = %method, count = count, "top method");
        }

        let now = Instant::now();
        let health = self.health.lock();
        for id in 0..self.registry.len() {
            let stats = analytics.node(id);
            let backoff_secs = health
                .backoff_remaining(id, now)
                .map_or(0, |remaining| remaining.as_secs().max(1));
            info!(
                node = %self.registry.url(id),
                requests = stats.requests.load(Ordering::Relaxed),
                success_rate_pct = stats.success_rate(),
                rate_limits = stats.rate_limits.load(Ordering::Relaxed),
                server_errors = stats.server_errors.load(Ordering::Relaxed),
                timeouts = stats.timeouts.load(Ordering::Relaxed),
                backoff_secs = backoff_secs,
                healthy = backoff_secs == 0,
                "node health"
            );
        }
    }
}
