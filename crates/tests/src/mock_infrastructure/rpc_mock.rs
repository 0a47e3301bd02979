//! Mock upstream RPC nodes for failover testing.
//!
//! Wraps mockito to stand in for one upstream node per instance, with
//! helpers for the response classes the dispatcher reacts to: success,
//! rate limiting (429), and server errors (5xx).

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};

/// One mock upstream node.
///
/// Each helper returns the created [`Mock`] so tests can assert hit
/// counts, including `.expect(0)` mocks that must never be contacted.
pub struct MockNode {
    server: ServerGuard,
}

impl MockNode {
    /// Starts a fresh mock node.
    pub async fn start() -> Self {
        Self { server: Server::new_async().await }
    }

    /// The node's URL, for registry construction.
    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Responds 200 with a JSON-RPC result for the given method.
    pub fn mock_result(&mut self, method: &str, result: &Value) -> Mock {
        self.server
            .mock("POST", "/")
            .match_body(Matcher::Regex(format!(r#""method"\s*:\s*"{method}""#)))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": result
                })
                .to_string(),
            )
            .create()
    }

    /// Responds 200 with a JSON-RPC result for any request body.
    pub fn mock_any_result(&mut self, result: &Value) -> Mock {
        self.server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": result
                })
                .to_string(),
            )
            .create()
    }

    /// Responds 429 to every request.
    pub fn mock_rate_limited(&mut self) -> Mock {
        self.server
            .mock("POST", "/")
            .with_status(429)
            .with_body("Too Many Requests")
            .create()
    }

    /// Responds with a client-error status to every request.
    pub fn mock_client_error(&mut self, status: usize) -> Mock {
        self.server.mock("POST", "/").with_status(status).with_body("Bad Request").create()
    }

    /// Responds 500 to every request.
    pub fn mock_server_error(&mut self) -> Mock {
        self.server
            .mock("POST", "/")
            .with_status(500)
            .with_body("Internal Server Error")
            .create()
    }

    /// Expects zero requests; `assert` on the returned mock verifies the
    /// node was never contacted.
    pub fn expect_untouched(&mut self) -> Mock {
        self.server.mock("POST", "/").expect(0).create()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_node_serves_result() {
        let mut node = MockNode::start().await;
        let mock = node.mock_result("eth_blockNumber", &json!("0x10"));

        let client = reqwest_client();
        let response: Value = client
            .post(node.url())
            .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "eth_blockNumber"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(response["result"], "0x10");
        mock.assert();
    }

    fn reqwest_client() -> reqwest::Client {
        conduit_core::dispatch::default_http_client().unwrap()
    }
}
