//! Integration tests for eth-network-client.
//!
//! These tests run the full pipeline against a local mockito server.
//!
//! Run with: `cargo test --test integration`

mod caching_integration;
mod retry_integration;

use eth_network_client::{InfuraNetwork, NetworkClient, RetryConfig};
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{Value, json};

/// Route client logs to the test output. Set `RUST_LOG=eth_network_client=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Retry settings that keep tests fast.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 5,
        initial_delay_ms: 1,
        max_delay_ms: 2,
        empty_result_max_attempts: 3,
    }
}

pub fn custom_client(server: &ServerGuard) -> NetworkClient {
    init_tracing();
    NetworkClient::custom("http://localhost:8545", "0x539")
        .unwrap()
        .rpc_endpoint(server.url())
        .retry_config(fast_retry())
        .build()
        .unwrap()
}

pub fn infura_client(server: &ServerGuard) -> NetworkClient {
    init_tracing();
    NetworkClient::infura(InfuraNetwork::Mainnet, "test-project")
        .unwrap()
        .rpc_endpoint(server.url())
        .retry_config(fast_retry())
        .build()
        .unwrap()
}

/// A successful JSON-RPC reply for requests whose body contains `matcher`.
/// Not yet registered; finish with `create_async`.
pub fn result_mock(server: &mut ServerGuard, matcher: Value, result: Value) -> Mock {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(matcher))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string())
}

/// `eth_blockNumber` at `block`. Not yet registered.
pub fn block_number_mock(server: &mut ServerGuard, block: &str) -> Mock {
    result_mock(server, json!({ "method": "eth_blockNumber" }), json!(block))
}
