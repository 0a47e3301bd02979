//! JSON-RPC 2.0 envelope types and the wallet-method classification set.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, sync::Arc, sync::LazyLock};

/// JSON-RPC protocol version constant to avoid repeated allocations.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for the JSON-RPC version string.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Methods that involve wallet interaction or transaction-state tracking.
///
/// These are routed to the public node pool only. Receipt and by-hash
/// lookups are included because they must hit the same class of node that
/// accepted the transaction, otherwise a lagging private node can report a
/// submitted transaction as missing.
pub const WALLET_METHODS: &[&str] = &[
    "eth_sendTransaction",
    "eth_sendRawTransaction",
    "eth_sign",
    "eth_signTransaction",
    "personal_sign",
    "eth_signTypedData",
    "eth_signTypedData_v4",
    "wallet_switchEthereumChain",
    "wallet_addEthereumChain",
    "eth_getTransactionReceipt",
    "eth_getTransactionByHash",
    "eth_estimateGas",
    "eth_gasPrice",
];

/// Pre-computed set for O(1) classification lookups.
static WALLET_METHODS_SET: LazyLock<AHashSet<&'static str>> =
    LazyLock::new(|| WALLET_METHODS.iter().copied().collect());

/// Returns `true` if the method belongs to the wallet/write class.
///
/// Unknown methods return `false` and fall through to the read pool.
#[inline]
#[must_use]
pub fn is_wallet_method(method: &str) -> bool {
    WALLET_METHODS_SET.contains(method)
}

/// JSON-RPC 2.0 response envelope.
///
/// Contains either `result` or `error`, never both. Request bodies are
/// deliberately *not* typed: the proxy forwards them verbatim as raw
/// `serde_json::Value`, including envelopes with missing or unusual
/// fields, so a request struct would only narrow what passes through.
/// The `id` is wrapped in an `Arc` so error responses can echo it without
/// deep-copying the JSON value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Arc<serde_json::Value>,
}

impl JsonRpcResponse {
    /// Creates an error response echoing the given request id.
    #[must_use]
    pub fn error(code: i32, message: String, id: Arc<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            result: None,
            error: Some(JsonRpcError { code, message, data: None }),
            id,
        }
    }
}

/// JSON-RPC 2.0 error object.
///
/// `-32603` (internal error) is the only code the proxy itself emits; all
/// other codes pass through from upstreams untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}
