//! Block tracking, caching and coalescing over HTTP.

use std::io::Write;
use std::time::Duration;

use eth_network_client::{BlockTag, JsonRpcRequest};
use futures::future::join_all;
use mockito::{Matcher, Server};
use serde_json::json;

use crate::{block_number_mock, custom_client, infura_client, result_mock};

#[tokio::test]
async fn test_latest_balance_is_pinned_and_cached() {
    let mut server = Server::new_async().await;
    let block_number = block_number_mock(&mut server, "0x42")
        .expect(1)
        .create_async()
        .await;
    let balance = result_mock(
        &mut server,
        json!({ "method": "eth_getBalance", "params": ["0xabc", "0x42"] }),
        json!("0x1000"),
    )
    .expect(1)
    .create_async()
    .await;

    let client = custom_client(&server);
    let params = vec![json!("0xabc"), json!("latest")];

    let first = client.provider().send("eth_getBalance", params.clone()).await.unwrap();
    let second = client.provider().send("eth_getBalance", params).await.unwrap();

    assert_eq!(first, json!("0x1000"));
    assert_eq!(second, json!("0x1000"));
    assert_eq!(client.cache().len(), 1);
    block_number.assert_async().await;
    balance.assert_async().await;
}

#[tokio::test]
async fn test_block_above_head_is_cached() {
    let mut server = Server::new_async().await;
    let _block_number = block_number_mock(&mut server, "0x42").create_async().await;
    let balance = result_mock(
        &mut server,
        json!({ "method": "eth_getBalance", "params": ["0xabc", "0x100"] }),
        json!("0x77"),
    )
    .expect(1)
    .create_async()
    .await;

    let client = custom_client(&server);
    client.block_tracker().get_latest_block().await.unwrap();
    for _ in 0..2 {
        let wei = client
            .provider()
            .get_balance("0xabc", BlockTag::Number(0x100))
            .await
            .unwrap();
        assert_eq!(wei, 0x77);
    }

    assert_eq!(client.cache().len(), 1);
    balance.assert_async().await;
}

#[tokio::test]
async fn test_chain_id_never_reaches_upstream() {
    let mut server = Server::new_async().await;
    let any = server.mock("POST", "/").expect(0).create_async().await;

    let custom = custom_client(&server);
    let infura = infura_client(&server);

    assert_eq!(custom.provider().chain_id().await.unwrap(), 1337);
    assert_eq!(
        infura.provider().send("net_version", vec![]).await.unwrap(),
        json!("1")
    );
    any.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_requests_share_one_upstream_call() {
    let mut server = Server::new_async().await;
    let _block_number = block_number_mock(&mut server, "0x10").create_async().await;
    let code = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_getCode" })))
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_millis(100));
            w.write_all(br#"{"jsonrpc":"2.0","id":1,"result":"0x6001"}"#)
        })
        .expect(1)
        .create_async()
        .await;

    let client = custom_client(&server);
    client.block_tracker().get_latest_block().await.unwrap();

    let provider = client.provider();
    let results = join_all((0..4).map(|_| provider.get_code("0xabc", BlockTag::Number(0x10)))).await;

    for result in results {
        assert_eq!(result.unwrap(), "0x6001");
    }
    assert_eq!(client.coalescer().pending(), 0);
    code.assert_async().await;
}

#[tokio::test]
async fn test_pending_is_never_cached() {
    let mut server = Server::new_async().await;
    let count = result_mock(
        &mut server,
        json!({ "method": "eth_getTransactionCount", "params": ["0xabc", "pending"] }),
        json!("0x3"),
    )
    .expect(2)
    .create_async()
    .await;

    let client = custom_client(&server);
    for _ in 0..2 {
        let nonce = client
            .provider()
            .get_transaction_count("0xabc", BlockTag::Pending)
            .await
            .unwrap();
        assert_eq!(nonce, 3);
    }

    assert!(client.cache().is_empty());
    count.assert_async().await;
}

#[tokio::test]
async fn test_receipt_ahead_of_tracker_advances_it() {
    let mut server = Server::new_async().await;
    let _block_number = block_number_mock(&mut server, "0x10").create_async().await;
    let _receipt = result_mock(
        &mut server,
        json!({ "method": "eth_getTransactionReceipt" }),
        json!({ "blockHash": "0x01", "blockNumber": "0x20", "status": "0x1" }),
    )
    .create_async()
    .await;

    let client = custom_client(&server);
    client
        .provider()
        .send("eth_getTransactionReceipt", vec![json!("0xtx")])
        .await
        .unwrap();

    assert_eq!(client.block_tracker().current_block(), Some(0x20));
}

#[tokio::test]
async fn test_response_echoes_caller_id() {
    let mut server = Server::new_async().await;
    let _block_number = block_number_mock(&mut server, "0x10").create_async().await;
    let _gas = result_mock(&mut server, json!({ "method": "eth_gasPrice" }), json!("0x9"))
        .create_async()
        .await;

    let client = custom_client(&server);
    let response = client
        .provider()
        .request(JsonRpcRequest::new("eth_gasPrice", vec![]).with_id("caller-7"))
        .await;

    assert_eq!(response.id, json!("caller-7"));
    assert_eq!(response.into_result().unwrap(), json!("0x9"));
}
