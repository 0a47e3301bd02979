//! # Conduit Core
//!
//! Core library for the Conduit JSON-RPC failover proxy.
//!
//! Conduit sits between a dapp frontend and a set of upstream blockchain
//! nodes. It accepts JSON-RPC envelopes, routes each one to a healthy node
//! under a failure-aware policy, serializes upstream traffic through a
//! single-consumer queue, and keeps rolling per-node health and analytics.
//! A companion two-tier read cache lets callers avoid issuing redundant
//! read requests in the first place.
//!
//! ## Components
//!
//! - **[`registry`]**: the canonical upstream node list. Pools (read vs.
//!   wallet/write) are index views over this list so health state is shared
//!   by construction.
//! - **[`health`]**: per-node failure counters and backoff windows.
//! - **[`dispatch`]**: candidate selection and per-node attempts with an
//!   8-second timeout, recording every outcome.
//! - **[`queue`]**: FIFO serialization of dispatches, one upstream call in
//!   flight at a time.
//! - **[`analytics`]**: request/outcome counters plus a periodic reporter.
//! - **[`cache`]**: forever-cached metadata tier and a 30-second TTL
//!   dynamic tier.
//! - **[`config`]**: layered configuration (defaults, TOML file, env).
//!
//! ## Request flow
//!
//! ```text
//! HTTP endpoint -> SerialQueue -> Dispatcher -> (classifier, health) -> upstream
//!                                      |
//!                                 Analytics
//! ```

pub mod analytics;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod queue;
pub mod registry;
pub mod types;
