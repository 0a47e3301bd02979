//! Two-tier read cache: permanent metadata, 30-second dynamic values.
//!
//! Sits in the caller's process in front of the proxy. Token metadata
//! (decimals, symbol) cannot change post-deployment and is cached forever;
//! balances and prices stay fresh for a bounded window. Callers wipe the
//! dynamic tier right after their own transaction confirms so the next
//! read is guaranteed fresh instead of waiting out the TTL.

use ahash::AHashMap;
use parking_lot::RwLock;
use std::time::{Duration, Instant};

/// Freshness window for the dynamic tier.
pub const DYNAMIC_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct DynamicEntry {
    value: serde_json::Value,
    stored_at: Instant,
}

/// The cache itself. Cheap to share behind an `Arc`; both tiers take their
/// own lock and share no expiry logic.
#[derive(Debug)]
pub struct ReadCache {
    metadata: RwLock<AHashMap<String, serde_json::Value>>,
    dynamic: RwLock<AHashMap<String, DynamicEntry>>,
    ttl: Duration,
}

impl Default for ReadCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadCache {
    /// Creates a cache with the standard 30-second dynamic TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DYNAMIC_CACHE_TTL)
    }

    /// Creates a cache with a custom dynamic-tier TTL.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            metadata: RwLock::new(AHashMap::new()),
            dynamic: RwLock::new(AHashMap::new()),
            ttl,
        }
    }

    /// Looks up an immutable property. Never expires.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<serde_json::Value> {
        self.metadata.read().get(key).cloned()
    }

    /// Stores an immutable property for the lifetime of the process.
    pub fn set_metadata(&self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.write().insert(key.into(), value);
    }

    /// Looks up a dynamic value against the current time.
    #[must_use]
    pub fn dynamic(&self, key: &str) -> Option<serde_json::Value> {
        self.dynamic_at(key, Instant::now())
    }

    /// Looks up a dynamic value against an explicit `now`.
    ///
    /// An entry older than the TTL is removed in place and reported as a
    /// miss, so stale values never linger once observed.
    #[must_use]
    pub fn dynamic_at(&self, key: &str, now: Instant) -> Option<serde_json::Value> {
        let expired = {
            let dynamic = self.dynamic.read();
            let entry = dynamic.get(key)?;
            if now.saturating_duration_since(entry.stored_at) <= self.ttl {
                return Some(entry.value.clone());
            }
            true
        };

        if expired {
            let mut dynamic = self.dynamic.write();
            // Re-check under the write lock: a concurrent set may have
            // refreshed the entry since the read.
            if let Some(entry) = dynamic.get(key) {
                if now.saturating_duration_since(entry.stored_at) <= self.ttl {
                    return Some(entry.value.clone());
                }
                dynamic.remove(key);
            }
        }
        None
    }

    /// Stores a dynamic value with the current time.
    pub fn set_dynamic(&self, key: impl Into<String>, value: serde_json::Value) {
        self.set_dynamic_at(key, value, Instant::now());
    }

    /// Stores a dynamic value with an explicit timestamp, overwriting any
    /// prior entry.
    pub fn set_dynamic_at(&self, key: impl Into<String>, value: serde_json::Value, now: Instant) {
        self.dynamic.write().insert(key.into(), DynamicEntry { value, stored_at: now });
    }

    /// Wipes the entire dynamic tier. Metadata is untouched.
    pub fn clear_dynamic(&self) {
        self.dynamic.write().clear();
    }
}

/// Composes a deterministic cache key from a value category, a
/// token/contract address, and (for user-scoped values) an account, so
/// distinct tokens and accounts never collide.
#[must_use]
pub fn cache_key(category: &str, address: &str, account: Option<&str>) -> String {
    match account {
        Some(account) => format!("{category}_{address}_{account}"),
        None => format!("{category}_{address}"),
    }
}
