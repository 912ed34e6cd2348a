//! Answers chain identity methods from configuration.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::RequestHandler;
use crate::error::RpcError;
use crate::types::{ChainId, JsonRpcRequest};

/// Answers `eth_chainId` (hex) and `net_version` (decimal) locally.
pub struct ChainIdResponder {
    chain_id: ChainId,
    next: Arc<dyn RequestHandler>,
}

impl ChainIdResponder {
    pub fn new(chain_id: ChainId, next: Arc<dyn RequestHandler>) -> Self {
        Self { chain_id, next }
    }

    fn answer(&self, method: &str) -> Option<Value> {
        match method {
            "eth_chainId" => Some(Value::String(self.chain_id.to_hex())),
            "net_version" => Some(Value::String(self.chain_id.to_decimal_string())),
            _ => None,
        }
    }
}

impl RequestHandler for ChainIdResponder {
    fn handle(&self, request: JsonRpcRequest) -> BoxFuture<'_, Result<Value, RpcError>> {
        Box::pin(async move {
            if let Some(answer) = self.answer(&request.method) {
                return Ok(answer);
            }
            self.next.handle(request).await
        })
    }
}
