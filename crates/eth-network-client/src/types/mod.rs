//! Core types for Ethereum JSON-RPC.
//!
//! Wire types, block tags, the method classification registry and
//! provider configuration.

mod block_tag;
mod jsonrpc;
mod method;
mod network;

pub use block_tag::{BlockTag, parse_hex_quantity, to_hex_quantity};
pub use jsonrpc::{JsonRpcErrorObject, JsonRpcRequest, JsonRpcResponse, is_empty_result};
pub use method::{MethodClass, classify_method, is_known_method};
pub use network::{ChainId, InfuraNetwork, MAX_SAFE_CHAIN_ID, ProviderConfig};
