//! Coalesces concurrent identical requests.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::oneshot;

use super::{CacheKey, RequestHandler, cache_key_for};
use crate::client::block_tracker::BlockTracker;
use crate::error::RpcError;
use crate::types::JsonRpcRequest;

type Waiters = Vec<oneshot::Sender<Result<Value, RpcError>>>;

/// Ensures at most one upstream call per cache key is outstanding.
///
/// The first caller for a key becomes the leader and forwards the request.
/// Callers arriving while it is pending wait for its outcome, which is
/// fanned out to them in arrival order. Requests without a cache key
/// (`"pending"`, unhandled methods) are forwarded directly.
pub struct InFlightCoalescer {
    tracker: Arc<BlockTracker>,
    in_flight: Mutex<HashMap<CacheKey, Waiters>>,
    next: Arc<dyn RequestHandler>,
}

impl InFlightCoalescer {
    pub fn new(tracker: Arc<BlockTracker>, next: Arc<dyn RequestHandler>) -> Self {
        Self {
            tracker,
            in_flight: Mutex::new(HashMap::new()),
            next,
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<CacheKey, Waiters>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of keys with an upstream call outstanding.
    pub fn pending(&self) -> usize {
        self.in_flight().len()
    }

    /// Join an outstanding call for `key`, or claim it. `None` means the
    /// caller is now the leader.
    fn join_or_lead(&self, key: &CacheKey) -> Option<oneshot::Receiver<Result<Value, RpcError>>> {
        match self.in_flight().entry(key.clone()) {
            Entry::Occupied(mut waiters) => {
                let (tx, rx) = oneshot::channel();
                waiters.get_mut().push(tx);
                Some(rx)
            }
            Entry::Vacant(slot) => {
                slot.insert(Vec::new());
                None
            }
        }
    }

    async fn coalesce(&self, request: JsonRpcRequest) -> Result<Value, RpcError> {
        let Some(key) = cache_key_for(&request, &self.tracker).await? else {
            return self.next.handle(request).await;
        };

        loop {
            let Some(rx) = self.join_or_lead(&key) else {
                break;
            };
            tracing::debug!(method = %key.method, "joined in-flight request");
            match rx.await {
                Ok(result) => return result,
                // The leader was cancelled before settling; try again.
                Err(_) => continue,
            }
        }

        let mut lead = Leader {
            coalescer: self,
            key: Some(key),
        };
        let result = self.next.handle(request).await;
        lead.settle(&result);
        result
    }
}

/// Owns an in-flight entry until its outcome is published.
///
/// Dropping it unsettled removes the entry, which wakes waiters with a
/// closed channel so one of them can take over.
struct Leader<'a> {
    coalescer: &'a InFlightCoalescer,
    key: Option<CacheKey>,
}

impl Leader<'_> {
    fn settle(&mut self, result: &Result<Value, RpcError>) {
        let Some(key) = self.key.take() else {
            return;
        };
        let waiters = self.coalescer.in_flight().remove(&key).unwrap_or_default();
        if !waiters.is_empty() {
            tracing::debug!(method = %key.method, waiters = waiters.len(), "fanning out result");
        }
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.coalescer.in_flight().remove(&key);
        }
    }
}

impl RequestHandler for InFlightCoalescer {
    fn handle(&self, request: JsonRpcRequest) -> BoxFuture<'_, Result<Value, RpcError>> {
        Box::pin(self.coalesce(request))
    }
}
