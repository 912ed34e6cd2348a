//! Client module for talking to an Ethereum JSON-RPC endpoint.
//!
//! This module provides the core client infrastructure:
//!
//! - [`NetworkClient`] — A wired client for one network, the single entry point
//! - [`NetworkClientBuilder`] — Fluent builder for configuring the client
//! - [`Provider`] — Request entry point with typed helpers
//! - [`BlockTracker`] — Latest known block number, polled in the background
//! - [`RetryingTransport`] — Upstream calls with provider-specific retry policy
//!
//! # Retry Policies
//!
//! | Policy | Provider | Empty results |
//! |--------|----------|---------------|
//! | [`InfuraRetryPolicy`] | Infura networks | retried at known blocks |
//! | [`CustomRpcRetryPolicy`] | Custom RPC URLs | returned as-is |
//!
//! # Pipeline
//!
//! Requests pass through the stages in [`middleware`] before reaching the
//! transport. See that module for the order.

mod block_tracker;
pub mod middleware;
mod network_client;
mod provider;
mod retry;
pub mod transport;

pub use block_tracker::{BlockTracker, BlockTrackerConfig};
pub use middleware::{
    BlockCache, BlockKey, BlockRefResolver, BlockTrackerInspector, CacheKey, ChainIdResponder,
    InFlightCoalescer, RequestHandler, RetryOnEmpty,
};
pub use network_client::{NetworkClient, NetworkClientBuilder, create_network_client};
pub use provider::Provider;
pub use retry::{
    CustomRpcRetryPolicy, GATEWAY_TIMEOUT_REASON, InfuraRetryPolicy, RetryConfig, RetryPolicy,
    RetryingTransport, Verdict,
};
pub use transport::{
    DEFAULT_REQUEST_TIMEOUT, HttpReply, HttpTransport, Transport, TransportError,
    TransportErrorKind, TransportFuture,
};
