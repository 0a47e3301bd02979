//! HTTP surface for the Conduit RPC proxy.

pub mod router;
