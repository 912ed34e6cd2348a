//! Request pipeline stages.
//!
//! A network client is an ordered chain of stages, each owning the next:
//!
//! | Stage | Role |
//! |-------|------|
//! | [`ChainIdResponder`] | answers `eth_chainId` and `net_version` from configuration |
//! | [`BlockRefResolver`] | rewrites `"latest"` block params to the current block number |
//! | [`BlockCache`] | block-aware memoization |
//! | [`InFlightCoalescer`] | one upstream call per cache key at a time |
//! | [`BlockTrackerInspector`] | advances the tracker from response block numbers |
//! | [`RetryOnEmpty`] | retries empty results at known blocks (Infura only) |
//!
//! The chain ends in a [`RetryingTransport`](super::RetryingTransport).

use futures::future::BoxFuture;
use serde_json::Value;

use super::block_tracker::BlockTracker;
use crate::error::RpcError;
use crate::types::{BlockTag, JsonRpcRequest, MethodClass, classify_method};

mod block_ref;
mod cache;
mod chain_id;
mod inflight;
mod inspector;
mod retry_on_empty;

pub use block_ref::BlockRefResolver;
pub use cache::BlockCache;
pub use chain_id::ChainIdResponder;
pub use inflight::InFlightCoalescer;
pub use inspector::BlockTrackerInspector;
pub use retry_on_empty::RetryOnEmpty;

/// One stage of the request pipeline.
pub trait RequestHandler: Send + Sync {
    /// Handle a request, returning its result.
    fn handle(&self, request: JsonRpcRequest) -> BoxFuture<'_, Result<Value, RpcError>>;
}

// ============================================================================
// Cache keys
// ============================================================================

/// Block component of a cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKey {
    /// Genesis. Stable across block advances.
    Earliest,
    /// A concrete block, either requested or current at request time.
    Number(u64),
}

/// Identity of a memoizable request.
///
/// The request id is not part of it. `params` is the canonical JSON of the
/// parameters with the block parameter (if any) blanked out; the block
/// lives in `block`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: String,
    pub params: String,
    pub block: BlockKey,
}

/// Derive the cache key for a request, or `None` if it must not be cached
/// or coalesced.
///
/// Uncacheable: methods the registry does not handle, `"pending"`, and
/// block params that are not a tag. Block numbers above the current head
/// are keyed like any other number.
pub(crate) async fn cache_key_for(
    request: &JsonRpcRequest,
    tracker: &BlockTracker,
) -> Result<Option<CacheKey>, RpcError> {
    let class = classify_method(&request.method);
    let (params, block) = match class {
        MethodClass::NotHandled => return Ok(None),
        MethodClass::NoBlockParam | MethodClass::BlockHashInResponse => {
            let head = tracker.get_latest_block().await?;
            (request.params.clone(), BlockKey::Number(head))
        }
        MethodClass::BlockParam { index } => {
            let raw = request.params.get(index).unwrap_or(&Value::Null);
            let Ok(tag) = BlockTag::from_param(raw) else {
                return Ok(None);
            };
            let block = match tag {
                None | Some(BlockTag::Latest) => BlockKey::Number(tracker.get_latest_block().await?),
                Some(BlockTag::Pending) => return Ok(None),
                Some(BlockTag::Earliest) | Some(BlockTag::Number(0)) => BlockKey::Earliest,
                Some(BlockTag::Number(n)) => BlockKey::Number(n),
            };
            let mut params = request.params.clone();
            pad_params(&mut params, index);
            params[index] = Value::Null;
            (params, block)
        }
    };

    Ok(Some(CacheKey {
        method: request.method.clone(),
        params: serde_json::to_string(&params)?,
        block,
    }))
}

/// Extend `params` with nulls so that `index` is addressable.
pub(crate) fn pad_params(params: &mut Vec<Value>, index: usize) {
    if params.len() <= index {
        params.resize(index + 1, Value::Null);
    }
}
