//! Block-aware response cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use serde_json::Value;

use super::{CacheKey, RequestHandler, cache_key_for};
use crate::client::block_tracker::BlockTracker;
use crate::error::RpcError;
use crate::types::{JsonRpcRequest, MethodClass, classify_method, is_empty_result};

/// Memoizes results keyed by method, params and block.
///
/// Entries never expire. A `"latest"` request misses after the head moves
/// because its key changes, while `"earliest"` and concrete block numbers
/// keep hitting. Empty results are never stored, and transaction lookups
/// are only stored when they carry a non-zero `blockHash`.
pub struct BlockCache {
    tracker: Arc<BlockTracker>,
    entries: Mutex<HashMap<CacheKey, Value>>,
    next: Arc<dyn RequestHandler>,
}

impl BlockCache {
    pub fn new(tracker: Arc<BlockTracker>, next: Arc<dyn RequestHandler>) -> Self {
        Self {
            tracker,
            entries: Mutex::new(HashMap::new()),
            next,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of cached results.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Drop every cached result.
    pub fn clear(&self) {
        self.entries().clear();
    }

    async fn lookup_or_fetch(&self, request: JsonRpcRequest) -> Result<Value, RpcError> {
        let Some(key) = cache_key_for(&request, &self.tracker).await? else {
            return self.next.handle(request).await;
        };

        let cached = self.entries().get(&key).cloned();
        if let Some(hit) = cached {
            tracing::debug!(method = %key.method, block = ?key.block, "cache hit");
            return Ok(hit);
        }
        tracing::debug!(method = %key.method, block = ?key.block, "cache miss");

        let class = classify_method(&request.method);
        let result = self.next.handle(request).await?;

        if is_storable(class, &result) {
            tracing::debug!(method = %key.method, block = ?key.block, "caching result");
            self.entries().insert(key, result.clone());
        }
        Ok(result)
    }
}

/// Whether a result may be written to the cache.
fn is_storable(class: MethodClass, result: &Value) -> bool {
    if is_empty_result(Some(result)) {
        return false;
    }
    match class {
        MethodClass::BlockHashInResponse => has_valid_block_hash(result),
        MethodClass::NotHandled => false,
        MethodClass::NoBlockParam | MethodClass::BlockParam { .. } => true,
    }
}

/// True when `result.blockHash` is a non-empty, non-zero hash.
pub(crate) fn has_valid_block_hash(result: &Value) -> bool {
    let Some(hash) = result.get("blockHash").and_then(Value::as_str) else {
        return false;
    };
    let digits = hash.strip_prefix("0x").unwrap_or(hash);
    !digits.is_empty() && digits.chars().any(|c| c != '0')
}

impl RequestHandler for BlockCache {
    fn handle(&self, request: JsonRpcRequest) -> BoxFuture<'_, Result<Value, RpcError>> {
        Box::pin(self.lookup_or_fetch(request))
    }
}

impl std::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCache")
            .field("entries", &self.len())
            .finish()
    }
}
