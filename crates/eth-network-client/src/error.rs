//! Error types for eth-network-client.
//!
//! # Error Hierarchy
//!
//! - [`Error`](enum@Error) — Main error type, returned when building a client
//!   - [`RpcError`] — Per-request failures (transport, rate limiting, retries exhausted, etc.)
//!   - [`ParseChainIdError`] — Invalid chain id in a custom provider configuration
//!   - [`ParseBlockTagError`] — Invalid block tag string
//!
//! # Error Handling Examples
//!
//! ```rust,no_run
//! use eth_network_client::*;
//!
//! # async fn example() -> Result<(), Error> {
//! let client = NetworkClient::custom("http://localhost:8545", "0x539")?.build()?;
//!
//! match client.provider().block_number().await {
//!     Ok(number) => println!("Latest block: {}", number),
//!     Err(RpcError::RateLimited) => println!("Slow down"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

/// Error parsing a chain id.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseChainIdError {
    #[error("Invalid chain ID \"{0}\": invalid hex string.")]
    InvalidHex(String),

    #[error("Invalid chain ID \"{0}\": numerical value greater than max safe value.")]
    Unsafe(String),
}

/// Error parsing a block tag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseBlockTagError {
    #[error("Invalid block tag '{0}': expected a hex block number, 'latest', 'earliest' or 'pending'")]
    InvalidTag(String),

    #[error("Invalid block tag: expected a string, got {0}")]
    NotAString(String),
}

// ============================================================================
// RPC Errors
// ============================================================================

/// Per-request errors.
///
/// `RpcError` is `Clone` because a single upstream outcome is fanned out to
/// every caller that was coalesced onto the same in-flight request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RpcError {
    // ─── HTTP status classification ───
    #[error("The method does not exist / is not available.")]
    MethodNotAvailable,

    #[error("Request is being rate limited.")]
    RateLimited,

    #[error("Non-200 status code: '{status}'")]
    NonSuccessStatus { status: u16 },

    /// Raw upstream body surfaced verbatim.
    #[error("{body}")]
    Upstream { body: String },

    // ─── Retry exhaustion ───
    #[error(
        "InfuraProvider - cannot complete request. All retries exhausted.\nOriginal Error:\n{reason}\n\n"
    )]
    RetriesExhausted { reason: String },

    #[error("RetryOnEmptyMiddleware - retries exhausted")]
    EmptyRetriesExhausted,

    #[error("JsonRpcEngine: Response has no error or result for request:\n{method}")]
    EmptyResponse { method: String },

    // ─── Transport ───
    #[error("request to {url} failed, reason: {reason}")]
    FetchFailed { url: String, reason: String },

    // ─── JSON-RPC ───
    #[error("RPC error: {message} (code: {code})")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RpcError {
    /// Returns true if the upstream asked us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RpcError::RateLimited)
    }

    /// Returns true if the call settled without a result or an error.
    pub fn is_empty_response(&self) -> bool {
        matches!(
            self,
            RpcError::EmptyResponse { .. } | RpcError::EmptyRetriesExhausted
        )
    }

    /// Returns true if automatic retries were attempted and ran out.
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(
            self,
            RpcError::RetriesExhausted { .. } | RpcError::EmptyRetriesExhausted
        )
    }

    /// Create an RPC error from a JSON-RPC error object.
    pub fn rpc(code: i64, message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        RpcError::Rpc {
            code,
            message: message.into(),
            data,
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Serialization(e.to_string())
    }
}

// ============================================================================
// Main Error Type
// ============================================================================

/// Main error type for eth-network-client operations.
#[derive(Debug, Error)]
pub enum Error {
    // ─── Configuration ───
    #[error("Invalid configuration: {0}")]
    Config(String),

    // ─── Parsing ───
    #[error(transparent)]
    ParseChainId(#[from] ParseChainIdError),

    #[error(transparent)]
    ParseBlockTag(#[from] ParseBlockTagError),

    // ─── RPC ───
    #[error(transparent)]
    Rpc(#[from] RpcError),
}
