//! Latest block tracking.
//!
//! The tracker is the only time source for cache keys. It fetches
//! `eth_blockNumber` on first use and then polls in the background until
//! it is destroyed or dropped. The tracked number never moves backwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::retry::RetryingTransport;
use crate::error::RpcError;
use crate::types::{JsonRpcRequest, parse_hex_quantity};

/// Block tracker configuration.
#[derive(Clone, Debug)]
pub struct BlockTrackerConfig {
    /// Time between polls.
    pub polling_interval: Duration,
    /// Time before polling again after a failed poll.
    pub retry_delay: Duration,
}

impl Default for BlockTrackerConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(20),
            retry_delay: Duration::from_millis(1000),
        }
    }
}

struct TrackerInner {
    transport: Arc<RetryingTransport>,
    config: BlockTrackerConfig,
    latest: watch::Sender<Option<u64>>,
    fetch_lock: tokio::sync::Mutex<()>,
    poller: Mutex<Option<JoinHandle<()>>>,
    shutdown: Notify,
    destroyed: AtomicBool,
}

impl TrackerInner {
    fn current(&self) -> Option<u64> {
        *self.latest.borrow()
    }

    fn advance(&self, number: u64) -> bool {
        let advanced = self.latest.send_if_modified(|current| match *current {
            Some(existing) if existing >= number => false,
            _ => {
                *current = Some(number);
                true
            }
        });
        if advanced {
            debug!(block = number, "latest block advanced");
        }
        advanced
    }

    async fn fetch(&self) -> Result<u64, RpcError> {
        let request = JsonRpcRequest::new("eth_blockNumber", vec![]);
        let result = self.transport.send(&request).await?;
        let number = result
            .as_str()
            .and_then(parse_hex_quantity)
            .ok_or_else(|| {
                RpcError::InvalidResponse(format!("invalid eth_blockNumber result: {}", result))
            })?;
        self.advance(number);
        Ok(self.current().unwrap_or(number))
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

/// Tracks the chain's latest block number.
pub struct BlockTracker {
    inner: Arc<TrackerInner>,
}

impl BlockTracker {
    /// Create a tracker that fetches through `transport`.
    ///
    /// Nothing is fetched until the first call to
    /// [`get_latest_block`](Self::get_latest_block).
    pub fn new(transport: Arc<RetryingTransport>, config: BlockTrackerConfig) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            inner: Arc::new(TrackerInner {
                transport,
                config,
                latest,
                fetch_lock: tokio::sync::Mutex::new(()),
                poller: Mutex::new(None),
                shutdown: Notify::new(),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// The last fetched block number, or `None` before the first fetch.
    pub fn current_block(&self) -> Option<u64> {
        self.inner.current()
    }

    /// The latest block number, fetching it if none is known yet.
    ///
    /// Concurrent first callers share a single fetch. Also starts
    /// background polling.
    pub async fn get_latest_block(&self) -> Result<u64, RpcError> {
        self.ensure_polling();
        if let Some(number) = self.current_block() {
            return Ok(number);
        }

        let _guard = self.inner.fetch_lock.lock().await;
        if let Some(number) = self.current_block() {
            return Ok(number);
        }
        self.inner.fetch().await
    }

    /// Issue one `eth_blockNumber` upstream and record the result.
    ///
    /// On failure the previous value is kept.
    pub async fn fetch_latest_block(&self) -> Result<u64, RpcError> {
        let _guard = self.inner.fetch_lock.lock().await;
        self.inner.fetch().await
    }

    /// Force a fetch now, starting background polling if needed.
    pub async fn check_for_latest_block(&self) -> Result<u64, RpcError> {
        self.ensure_polling();
        self.fetch_latest_block().await
    }

    /// Move the current block forward to `number`.
    ///
    /// Returns false if the tracker is already at or past it.
    pub fn advance_to(&self, number: u64) -> bool {
        self.inner.advance(number)
    }

    /// Observe block changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.inner.latest.subscribe()
    }

    /// Returns true while the background poll loop is active.
    pub fn is_running(&self) -> bool {
        if self.inner.is_destroyed() {
            return false;
        }
        let poller = self
            .inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        poller.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop polling. Idempotent.
    ///
    /// A poll already on the wire settles, but no further polls start.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.shutdown.notify_waiters();
        debug!("block tracker destroyed");
    }

    fn ensure_polling(&self) {
        if self.inner.is_destroyed() {
            return;
        }
        // Polling needs a runtime; without one the tracker works on demand.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let mut poller = self
            .inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if poller.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        debug!(
            interval_ms = self.inner.config.polling_interval.as_millis() as u64,
            "starting block polling"
        );
        *poller = Some(runtime.spawn(poll_loop(Arc::clone(&self.inner))));
    }
}

async fn poll_loop(inner: Arc<TrackerInner>) {
    let mut delay = inner.config.polling_interval;

    loop {
        let shutdown = inner.shutdown.notified();
        tokio::pin!(shutdown);
        // Register before the flag check so a destroy in between is seen.
        shutdown.as_mut().enable();
        if inner.is_destroyed() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.as_mut() => return,
        }
        if inner.is_destroyed() {
            return;
        }

        trace!("polling latest block");
        delay = match inner.fetch().await {
            Ok(_) => inner.config.polling_interval,
            Err(e) => {
                warn!(error = %e, "failed to fetch latest block, will retry");
                inner.config.retry_delay
            }
        };
    }
}

impl Drop for BlockTracker {
    fn drop(&mut self) {
        self.inner.destroyed.store(true, Ordering::Release);
        let mut poller = self
            .inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = poller.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for BlockTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockTracker")
            .field("current_block", &self.current_block())
            .field("config", &self.inner.config)
            .field("destroyed", &self.inner.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::retry::{CustomRpcRetryPolicy, RetryConfig};
    use crate::client::transport::mock::ScriptedTransport;
    use serde_json::json;

    fn tracker_with(transport: Arc<ScriptedTransport>, config: BlockTrackerConfig) -> BlockTracker {
        let retry = RetryConfig {
            max_attempts: 1,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            empty_result_max_attempts: 1,
        };
        let transport = Arc::new(RetryingTransport::new(
            transport,
            Arc::new(CustomRpcRetryPolicy),
            retry,
        ));
        BlockTracker::new(transport, config)
    }

    fn tracker(transport: Arc<ScriptedTransport>) -> BlockTracker {
        tracker_with(transport, BlockTrackerConfig::default())
    }

    #[test]
    fn test_default_config() {
        let config = BlockTrackerConfig::default();
        assert_eq!(config.polling_interval, Duration::from_secs(20));
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_current_block_is_none_before_fetch() {
        let transport = Arc::new(ScriptedTransport::new());
        let tracker = tracker(transport.clone());
        assert_eq!(tracker.current_block(), None);
        assert!(!tracker.is_running());
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_latest_block_fetches_once() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_result("eth_blockNumber", json!("0x42"));
        let tracker = tracker(transport.clone());

        assert_eq!(tracker.get_latest_block().await.unwrap(), 0x42);
        assert_eq!(tracker.get_latest_block().await.unwrap(), 0x42);
        assert_eq!(tracker.current_block(), Some(0x42));
        assert_eq!(transport.calls("eth_blockNumber"), 1);
        assert!(tracker.is_running());
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_share_fetch() {
        let transport =
            Arc::new(ScriptedTransport::new().with_latency(Duration::from_millis(20)));
        transport.set_result("eth_blockNumber", json!("0x10"));
        let tracker = tracker(transport.clone());

        let (a, b) = tokio::join!(tracker.get_latest_block(), tracker.get_latest_block());
        assert_eq!(a.unwrap(), 0x10);
        assert_eq!(b.unwrap(), 0x10);
        assert_eq!(transport.calls("eth_blockNumber"), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_value() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_result("eth_blockNumber", json!("0x5"));
        transport.push_reply("eth_blockNumber", 500, "");
        let tracker = tracker(transport.clone());

        assert_eq!(tracker.fetch_latest_block().await.unwrap(), 5);
        assert!(tracker.fetch_latest_block().await.is_err());
        assert_eq!(tracker.current_block(), Some(5));
    }

    #[tokio::test]
    async fn test_invalid_block_number_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_result("eth_blockNumber", json!(42));
        let tracker = tracker(transport);

        assert!(matches!(
            tracker.fetch_latest_block().await,
            Err(RpcError::InvalidResponse(_))
        ));
        assert_eq!(tracker.current_block(), None);
    }

    #[tokio::test]
    async fn test_tracker_never_rolls_back() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_result("eth_blockNumber", json!("0x10"));
        transport.push_result("eth_blockNumber", json!("0x8"));
        let tracker = tracker(transport);

        tracker.fetch_latest_block().await.unwrap();
        assert_eq!(tracker.fetch_latest_block().await.unwrap(), 0x10);
        assert_eq!(tracker.current_block(), Some(0x10));
    }

    #[tokio::test]
    async fn test_advance_to_is_forward_only() {
        let tracker = tracker(Arc::new(ScriptedTransport::new()));
        assert!(tracker.advance_to(10));
        assert!(!tracker.advance_to(9));
        assert!(!tracker.advance_to(10));
        assert!(tracker.advance_to(11));
        assert_eq!(tracker.current_block(), Some(11));
    }

    #[tokio::test]
    async fn test_subscribe_observes_new_blocks() {
        let tracker = tracker(Arc::new(ScriptedTransport::new()));
        let mut rx = tracker.subscribe();
        assert_eq!(*rx.borrow(), None);

        tracker.advance_to(7);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_advances_block() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_result("eth_blockNumber", json!("0x1"));
        transport.set_result("eth_blockNumber", json!("0x2"));
        let tracker = tracker(transport.clone());

        assert_eq!(tracker.get_latest_block().await.unwrap(), 1);
        tokio::time::sleep(Duration::from_secs(21)).await;

        assert_eq!(tracker.current_block(), Some(2));
        assert_eq!(transport.calls("eth_blockNumber"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_is_swallowed_and_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_result("eth_blockNumber", json!("0x1"));
        transport.push_reply("eth_blockNumber", 500, "");
        transport.set_result("eth_blockNumber", json!("0x3"));
        let tracker = tracker(transport.clone());

        tracker.get_latest_block().await.unwrap();
        // First poll at 20s fails; the retry one second later succeeds.
        tokio::time::sleep(Duration::from_millis(21_500)).await;

        assert_eq!(tracker.current_block(), Some(3));
        assert_eq!(transport.calls("eth_blockNumber"), 3);
        assert!(tracker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_stops_polling() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_result("eth_blockNumber", json!("0x1"));
        let tracker = tracker(transport.clone());

        tracker.get_latest_block().await.unwrap();
        tracker.destroy();
        tracker.destroy();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert!(!tracker.is_running());
        assert_eq!(transport.calls("eth_blockNumber"), 1);
    }

    #[tokio::test]
    async fn test_destroyed_tracker_still_fetches_on_demand() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_result("eth_blockNumber", json!("0x9"));
        let tracker = tracker(transport);

        tracker.destroy();
        assert_eq!(tracker.get_latest_block().await.unwrap(), 9);
        assert!(!tracker.is_running());
    }
}
