//! Caller-facing JSON-RPC provider.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::middleware::RequestHandler;
use crate::error::RpcError;
use crate::types::{BlockTag, JsonRpcRequest, JsonRpcResponse, parse_hex_quantity};

/// Entry point for requests. Cheap to clone; clones share the pipeline.
///
/// # Example
///
/// ```rust,no_run
/// # use eth_network_client::*;
/// # async fn example() -> Result<(), Error> {
/// let client = NetworkClient::custom("http://localhost:8545", "0x539")?.build()?;
/// let provider = client.provider();
///
/// let block = provider.block_number().await?;
/// let balance = provider
///     .get_balance("0x0000000000000000000000000000000000000001", BlockTag::Latest)
///     .await?;
/// println!("{} wei at block {}", balance, block);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Provider {
    pipeline: Arc<dyn RequestHandler>,
}

impl Provider {
    pub(crate) fn new(pipeline: Arc<dyn RequestHandler>) -> Self {
        Self { pipeline }
    }

    /// Handle a raw JSON-RPC request.
    ///
    /// The response carries the caller's id. Failures become an `error`
    /// member.
    pub async fn request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        match self.pipeline.handle(request).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::failure(id, &e),
        }
    }

    /// Send a method with positional params and return the raw result.
    pub async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        self.pipeline
            .handle(JsonRpcRequest::new(method, params))
            .await
    }

    /// Send a method and deserialize its result.
    ///
    /// `params` must serialize to an array, `()` or `null`; any other value
    /// is sent as the single parameter.
    pub async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, RpcError> {
        let params = match serde_json::to_value(params)? {
            Value::Array(params) => params,
            Value::Null => Vec::new(),
            single => vec![single],
        };
        let result = self.send(method, params).await?;
        Ok(serde_json::from_value(result)?)
    }

    // ========================================================================
    // Typed helpers
    // ========================================================================

    /// Latest block number.
    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let result: String = self.call("eth_blockNumber", ()).await?;
        parse_quantity(&result)
    }

    /// Chain id as a number.
    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        let result: String = self.call("eth_chainId", ()).await?;
        parse_quantity(&result)
    }

    /// Balance in wei.
    pub async fn get_balance(&self, address: &str, block: BlockTag) -> Result<u128, RpcError> {
        let result: String = self.call("eth_getBalance", (address, block)).await?;
        parse_wei(&result)
    }

    /// Nonce of an account.
    pub async fn get_transaction_count(
        &self,
        address: &str,
        block: BlockTag,
    ) -> Result<u64, RpcError> {
        let result: String = self
            .call("eth_getTransactionCount", (address, block))
            .await?;
        parse_quantity(&result)
    }

    /// Contract bytecode as a hex string (`"0x"` for accounts without code).
    pub async fn get_code(&self, address: &str, block: BlockTag) -> Result<String, RpcError> {
        self.call("eth_getCode", (address, block)).await
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider").finish_non_exhaustive()
    }
}

fn parse_quantity(s: &str) -> Result<u64, RpcError> {
    parse_hex_quantity(s)
        .ok_or_else(|| RpcError::InvalidResponse(format!("expected a hex quantity, got {}", s)))
}

fn parse_wei(s: &str) -> Result<u128, RpcError> {
    s.strip_prefix("0x")
        .filter(|digits| !digits.is_empty())
        .and_then(|digits| u128::from_str_radix(digits, 16).ok())
        .ok_or_else(|| RpcError::InvalidResponse(format!("expected a hex quantity, got {}", s)))
}
