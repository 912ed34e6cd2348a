//! Retries empty results for blocks the node should already have.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use super::RequestHandler;
use crate::client::block_tracker::BlockTracker;
use crate::client::retry::RetryConfig;
use crate::error::RpcError;
use crate::types::{BlockTag, JsonRpcRequest, classify_method, is_empty_result};

/// Retries a request whose block parameter is a concrete block at or below
/// the current head while the result comes back empty.
///
/// Gives up with [`RpcError::EmptyRetriesExhausted`] after
/// `empty_result_max_attempts` attempts.
pub struct RetryOnEmpty {
    tracker: Arc<BlockTracker>,
    max_attempts: u32,
    delay: Duration,
    next: Arc<dyn RequestHandler>,
}

impl RetryOnEmpty {
    pub fn new(tracker: Arc<BlockTracker>, config: &RetryConfig, next: Arc<dyn RequestHandler>) -> Self {
        Self {
            tracker,
            max_attempts: config.empty_result_max_attempts.max(1),
            delay: Duration::from_millis(config.initial_delay_ms),
            next,
        }
    }

    /// The concrete block the request targets, if it qualifies.
    ///
    /// Only numbers the caller supplied count; a `"latest"` filled in from
    /// the tracker does not.
    async fn target_block(&self, request: &JsonRpcRequest) -> Result<Option<u64>, RpcError> {
        if request.block_resolved {
            return Ok(None);
        }
        let Some(index) = classify_method(&request.method).block_param_index() else {
            return Ok(None);
        };
        let raw = request.params.get(index).unwrap_or(&Value::Null);
        let Ok(Some(BlockTag::Number(block))) = BlockTag::from_param(raw) else {
            return Ok(None);
        };
        // Zero is genesis; it is treated like "earliest".
        if block == 0 {
            return Ok(None);
        }
        let head = self.tracker.get_latest_block().await?;
        Ok((block <= head).then_some(block))
    }

    async fn retry(&self, request: JsonRpcRequest) -> Result<Value, RpcError> {
        let Some(block) = self.target_block(&request).await? else {
            return self.next.handle(request).await;
        };

        for attempt in 0..self.max_attempts {
            let result = self.next.handle(request.clone()).await?;
            if !is_empty_result(Some(&result)) {
                return Ok(result);
            }
            tracing::warn!(
                method = %request.method,
                block,
                attempt = attempt + 1,
                max_attempts = self.max_attempts,
                "empty result for known block"
            );
            if attempt + 1 < self.max_attempts {
                tokio::time::sleep(self.delay).await;
            }
        }
        Err(RpcError::EmptyRetriesExhausted)
    }
}

impl RequestHandler for RetryOnEmpty {
    fn handle(&self, request: JsonRpcRequest) -> BoxFuture<'_, Result<Value, RpcError>> {
        Box::pin(self.retry(request))
    }
}
