//! Canonical upstream node registry with pool views.
//!
//! Every node-indexed structure in the proxy (health, per-node stats) is
//! keyed by a [`NodeId`]: the node's position in the single canonical list
//! held here. The read and wallet pools are index *views* over that list,
//! never copies, so a node that appears in both pools shares one health
//! record by construction.

use crate::types::is_wallet_method;
use std::sync::Arc;

/// Index of a node in the canonical registry list.
pub type NodeId = usize;

/// The pool of candidate nodes for a request class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    /// Private node first, then every public node. Used for general reads.
    Read,
    /// Public nodes only. Used for wallet/write and transaction-state
    /// methods; the private node is never a candidate here.
    Wallet,
}

/// Canonical list of upstream nodes and the pool views over it.
///
/// The private node always occupies index 0; public nodes follow in their
/// configured order. Pool order is significant: it is the declared priority
/// used for tie-breaks and for the force-unblock fallback.
#[derive(Debug)]
pub struct NodeRegistry {
    urls: Vec<Arc<str>>,
    read_pool: Vec<NodeId>,
    wallet_pool: Vec<NodeId>,
}

impl NodeRegistry {
    /// Builds a registry from the private node URL and the public node URLs.
    #[must_use]
    pub fn new(private_url: &str, public_urls: &[String]) -> Self {
        let mut urls: Vec<Arc<str>> = Vec::with_capacity(1 + public_urls.len());
        urls.push(Arc::from(private_url));
        urls.extend(public_urls.iter().map(|u| Arc::from(u.as_str())));

        let read_pool = (0..urls.len()).collect();
        let wallet_pool = (1..urls.len()).collect();

        Self { urls, read_pool, wallet_pool }
    }

    /// Total number of registered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Returns the URL for a node id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range; node ids only come from this
    /// registry's own pools.
    #[must_use]
    pub fn url(&self, id: NodeId) -> &str {
        &self.urls[id]
    }

    /// Classifies a JSON-RPC method into its candidate pool.
    #[must_use]
    pub fn pool_for(&self, method: &str) -> Pool {
        if is_wallet_method(method) {
            Pool::Wallet
        } else {
            Pool::Read
        }
    }

    /// Returns the ordered node ids for a pool.
    #[must_use]
    pub fn pool(&self, pool: Pool) -> &[NodeId] {
        match pool {
            Pool::Read => &self.read_pool,
            Pool::Wallet => &self.wallet_pool,
        }
    }

    /// Convenience: the ordered candidate ids for a method.
    #[must_use]
    pub fn candidates_for(&self, method: &str) -> &[NodeId] {
        self.pool(self.pool_for(method))
    }
}
