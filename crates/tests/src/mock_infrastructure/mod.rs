//! Reusable mock infrastructure for proxy integration tests.
//!
//! - `rpc_mock`: Mock upstream RPC nodes built on mockito, with helpers
//!   for success, rate-limit, and server-error responses

pub mod rpc_mock;

pub use rpc_mock::MockNode;
