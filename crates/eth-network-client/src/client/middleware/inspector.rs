//! Keeps the block tracker ahead of the blocks responses refer to.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::RequestHandler;
use crate::client::block_tracker::BlockTracker;
use crate::error::RpcError;
use crate::types::{JsonRpcRequest, MethodClass, classify_method, parse_hex_quantity};

/// Refreshes the tracker when a transaction lookup reports a block newer
/// than the tracker's current one.
///
/// After the refresh the tracker is at least at the reported block.
pub struct BlockTrackerInspector {
    tracker: Arc<BlockTracker>,
    next: Arc<dyn RequestHandler>,
}

impl BlockTrackerInspector {
    pub fn new(tracker: Arc<BlockTracker>, next: Arc<dyn RequestHandler>) -> Self {
        Self { tracker, next }
    }

    async fn inspect(&self, request: JsonRpcRequest) -> Result<Value, RpcError> {
        let class = classify_method(&request.method);
        let result = self.next.handle(request).await?;

        if class != MethodClass::BlockHashInResponse {
            return Ok(result);
        }
        let Some(observed) = result
            .get("blockNumber")
            .and_then(Value::as_str)
            .and_then(parse_hex_quantity)
        else {
            return Ok(result);
        };

        if self.tracker.current_block().is_none_or(|current| observed > current) {
            tracing::debug!(block = observed, "response is ahead of tracker, refreshing");
            if let Err(e) = self.tracker.check_for_latest_block().await {
                tracing::warn!(error = %e, "failed to refresh latest block");
            }
            self.tracker.advance_to(observed);
        }
        Ok(result)
    }
}

impl RequestHandler for BlockTrackerInspector {
    fn handle(&self, request: JsonRpcRequest) -> BoxFuture<'_, Result<Value, RpcError>> {
        Box::pin(self.inspect(request))
    }
}
