//! Rewrites `"latest"` block parameters to the current block number.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::{RequestHandler, pad_params};
use crate::client::block_tracker::BlockTracker;
use crate::error::RpcError;
use crate::types::{BlockTag, JsonRpcRequest, classify_method, to_hex_quantity};

/// Replaces a `"latest"` or absent block parameter with the tracker's
/// current block, so that later stages see a stable block number.
///
/// `"earliest"`, `"pending"` and concrete numbers pass through unchanged.
pub struct BlockRefResolver {
    tracker: Arc<BlockTracker>,
    next: Arc<dyn RequestHandler>,
}

impl BlockRefResolver {
    pub fn new(tracker: Arc<BlockTracker>, next: Arc<dyn RequestHandler>) -> Self {
        Self { tracker, next }
    }

    async fn resolve(&self, mut request: JsonRpcRequest) -> Result<JsonRpcRequest, RpcError> {
        let Some(index) = classify_method(&request.method).block_param_index() else {
            return Ok(request);
        };

        let raw = request.params.get(index).unwrap_or(&Value::Null);
        if !matches!(BlockTag::from_param(raw), Ok(None) | Ok(Some(BlockTag::Latest))) {
            return Ok(request);
        }

        let head = self.tracker.get_latest_block().await?;
        pad_params(&mut request.params, index);
        request.params[index] = Value::String(to_hex_quantity(head));
        request.block_resolved = true;
        tracing::debug!(method = %request.method, block = head, "resolved latest block reference");
        Ok(request)
    }
}

impl RequestHandler for BlockRefResolver {
    fn handle(&self, request: JsonRpcRequest) -> BoxFuture<'_, Result<Value, RpcError>> {
        Box::pin(async move {
            let request = self.resolve(request).await?;
            self.next.handle(request).await
        })
    }
}
