//! Upstream failure handling for both provider types.

use std::io::Write;
use std::time::Duration;

use eth_network_client::{InfuraNetwork, NetworkClient, RetryConfig, RpcError};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::{Value, json};

use crate::{block_number_mock, custom_client, infura_client, init_tracing, result_mock};

async fn status_mock(server: &mut ServerGuard, method: &str, status: usize, hits: usize) -> mockito::Mock {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": method })))
        .with_status(status)
        .with_body("upstream says no")
        .expect(hits)
        .create_async()
        .await
}

async fn gas_price(client: &NetworkClient) -> Result<Value, RpcError> {
    client.provider().send("eth_gasPrice", vec![]).await
}

async fn with_block_number(server: &mut ServerGuard) -> mockito::Mock {
    block_number_mock(server, "0x10").create_async().await
}

// ============================================================================
// Status classification
// ============================================================================

#[tokio::test]
async fn test_405_is_method_not_available() {
    for infura in [false, true] {
        let mut server = Server::new_async().await;
        let _block = with_block_number(&mut server).await;
        let gas = status_mock(&mut server, "eth_gasPrice", 405, 1).await;

        let client = if infura { infura_client(&server) } else { custom_client(&server) };
        let err = gas_price(&client).await.unwrap_err();

        assert_eq!(err, RpcError::MethodNotAvailable, "infura={infura}");
        gas.assert_async().await;
    }
}

#[tokio::test]
async fn test_infura_429_is_rate_limited() {
    let mut server = Server::new_async().await;
    let _block = with_block_number(&mut server).await;
    let gas = status_mock(&mut server, "eth_gasPrice", 429, 1).await;

    let err = gas_price(&infura_client(&server)).await.unwrap_err();

    assert!(err.is_rate_limited());
    gas.assert_async().await;
}

#[tokio::test]
async fn test_custom_418_is_rate_limited_and_429_is_not() {
    let mut server = Server::new_async().await;
    let _block = with_block_number(&mut server).await;
    let gas = status_mock(&mut server, "eth_gasPrice", 418, 1).await;
    let fees = status_mock(&mut server, "eth_maxPriorityFeePerGas", 429, 1).await;

    let client = custom_client(&server);
    assert_eq!(gas_price(&client).await.unwrap_err(), RpcError::RateLimited);
    assert_eq!(
        client
            .provider()
            .send("eth_maxPriorityFeePerGas", vec![])
            .await
            .unwrap_err(),
        RpcError::NonSuccessStatus { status: 429 }
    );
    gas.assert_async().await;
    fees.assert_async().await;
}

#[tokio::test]
async fn test_infura_other_status_surfaces_body() {
    let mut server = Server::new_async().await;
    let _block = with_block_number(&mut server).await;
    let gas = status_mock(&mut server, "eth_gasPrice", 500, 1).await;

    let err = gas_price(&infura_client(&server)).await.unwrap_err();

    assert_eq!(
        err,
        RpcError::Upstream {
            body: "upstream says no".to_string()
        }
    );
    gas.assert_async().await;
}

// ============================================================================
// Retry exhaustion
// ============================================================================

#[tokio::test]
async fn test_custom_503_exhaustion_is_empty_response() {
    let mut server = Server::new_async().await;
    let _block = with_block_number(&mut server).await;
    let gas = status_mock(&mut server, "eth_gasPrice", 503, 5).await;

    let err = gas_price(&custom_client(&server)).await.unwrap_err();

    assert!(err.is_empty_response());
    assert!(err.to_string().contains("eth_gasPrice"));
    gas.assert_async().await;
}

#[tokio::test]
async fn test_infura_504_exhaustion_is_retries_exhausted() {
    let mut server = Server::new_async().await;
    let _block = with_block_number(&mut server).await;
    let gas = status_mock(&mut server, "eth_gasPrice", 504, 5).await;

    let err = gas_price(&infura_client(&server)).await.unwrap_err();

    assert!(err.is_retries_exhausted());
    assert!(err.to_string().contains("Gateway timeout"));
    gas.assert_async().await;
}

#[tokio::test]
async fn test_infura_retries_malformed_body() {
    let mut server = Server::new_async().await;
    let _block = with_block_number(&mut server).await;
    let gas = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_gasPrice" })))
        .with_status(200)
        .with_body("<html>not json</html>")
        .expect(5)
        .create_async()
        .await;

    let err = gas_price(&infura_client(&server)).await.unwrap_err();

    assert!(err.is_retries_exhausted());
    assert!(err.to_string().contains("SyntaxError"));
    gas.assert_async().await;
}

#[tokio::test]
async fn test_slow_upstream_times_out_and_is_retried() {
    init_tracing();
    let mut server = Server::new_async().await;
    let _slow = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_sendRawTransaction" })))
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_millis(200));
            w.write_all(br#"{"jsonrpc":"2.0","id":1,"result":"0xhash"}"#)
        })
        .create_async()
        .await;

    let client = NetworkClient::infura(InfuraNetwork::Mainnet, "test-project")
        .unwrap()
        .rpc_endpoint(server.url())
        .request_timeout(Duration::from_millis(20))
        .retry_config(RetryConfig {
            max_attempts: 2,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            empty_result_max_attempts: 1,
        })
        .build()
        .unwrap();

    let err = client
        .provider()
        .send("eth_sendRawTransaction", vec![json!("0xsigned")])
        .await
        .unwrap_err();

    // Infura retries timeouts and reports the last one on exhaustion.
    assert!(err.is_retries_exhausted());
    assert!(err.to_string().contains("ETIMEDOUT"));
}

// ============================================================================
// JSON-RPC errors and empty results
// ============================================================================

#[tokio::test]
async fn test_json_rpc_error_is_not_retried() {
    let mut server = Server::new_async().await;
    let _block = with_block_number(&mut server).await;
    let call = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_call" })))
        .with_status(200)
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": 3, "message": "execution reverted", "data": "0x08c379a0" }
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let err = infura_client(&server)
        .provider()
        .send("eth_call", vec![json!({ "to": "0xabc" }), json!("latest")])
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RpcError::Rpc {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some(json!("0x08c379a0")),
        }
    );
    call.assert_async().await;
}

#[tokio::test]
async fn test_infura_empty_latest_result_is_returned_once() {
    let mut server = Server::new_async().await;
    let _block = with_block_number(&mut server).await;
    let balance = result_mock(
        &mut server,
        json!({ "method": "eth_getBalance", "params": ["0xabc", "0x10"] }),
        Value::Null,
    )
    .expect(1)
    .create_async()
    .await;

    let result = infura_client(&server)
        .provider()
        .send("eth_getBalance", vec![json!("0xabc"), json!("latest")])
        .await
        .unwrap();

    assert_eq!(result, Value::Null);
    balance.assert_async().await;
}

#[tokio::test]
async fn test_infura_empty_result_at_known_block_is_retried() {
    let mut server = Server::new_async().await;
    let _block = with_block_number(&mut server).await;
    let block = result_mock(
        &mut server,
        json!({ "method": "eth_getBlockByNumber", "params": ["0x8", false] }),
        Value::Null,
    )
    .expect(3)
    .create_async()
    .await;

    let err = infura_client(&server)
        .provider()
        .send("eth_getBlockByNumber", vec![json!("0x8"), json!(false)])
        .await
        .unwrap_err();

    assert_eq!(err, RpcError::EmptyRetriesExhausted);
    block.assert_async().await;
}
