//! A caching, retrying JSON-RPC client for Ethereum networks.
//!
//! **eth-network-client** wires a request pipeline around a single upstream
//! endpoint, either an Infura network or a custom RPC URL. It tracks the
//! latest block, memoizes block-pinned responses, coalesces concurrent
//! identical requests, and retries transient upstream failures.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use eth_network_client::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), eth_network_client::Error> {
//!     // Configure once
//!     let client = NetworkClient::custom("http://localhost:8545", "0x539")?.build()?;
//!
//!     // Requests for "latest" are pinned to the tracked block and cached
//!     let balance = client
//!         .provider()
//!         .get_balance("0x0000000000000000000000000000000000000001", BlockTag::Latest)
//!         .await?;
//!     println!("Balance: {} wei", balance);
//!
//!     client.destroy();
//!     Ok(())
//! }
//! ```
//!
//! # Design Principles
//!
//! 1. **Single entry point**: Everything hangs off the [`NetworkClient`]
//! 2. **Isolated state**: Each client owns its tracker, cache and in-flight map
//! 3. **Block-aware caching**: Only responses pinned to a concrete block are reused
//! 4. **Provider-aware retries**: Infura and custom endpoints fail differently
//!
//! # Core Types
//!
//! - [`BlockTag`] - Block parameter (`latest`, `earliest`, `pending` or a number)
//! - [`ChainId`] - Validated chain id
//! - [`ProviderConfig`] - Which upstream to talk to
//! - [`JsonRpcRequest`], [`JsonRpcResponse`] - Wire envelopes
//!
//! # String Parsing
//!
//! ```
//! use eth_network_client::{BlockTag, ChainId, InfuraNetwork};
//!
//! let block: BlockTag = "0x10".parse().unwrap();
//! let chain: ChainId = "0x539".parse().unwrap();
//! let network: InfuraNetwork = "sepolia".parse().unwrap();
//! assert_eq!(block, BlockTag::Number(16));
//! assert_eq!(chain.value(), 1337);
//! assert_eq!(network.chain_id().to_hex(), "0xaa36a7");
//! ```

pub mod client;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{Error, ParseBlockTagError, ParseChainIdError, RpcError};
pub use types::*;

// Re-export client types
pub use client::{
    BlockTracker, BlockTrackerConfig, CustomRpcRetryPolicy, HttpTransport, InfuraRetryPolicy,
    NetworkClient, NetworkClientBuilder, Provider, RequestHandler, RetryConfig, RetryPolicy,
    RetryingTransport, Transport, create_network_client,
};
