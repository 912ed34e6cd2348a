//! Method classification registry.
//!
//! One table drives both the block reference resolver and the cache: it
//! says whether a method is cacheable, where its block parameter lives, and
//! whether its responses must carry a valid `blockHash` to be stored.

/// How the client treats a JSON-RPC method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MethodClass {
    /// Passed through untouched. Never cached, never coalesced.
    NotHandled,
    /// Takes no block parameter. Cached under the current block number.
    NoBlockParam,
    /// Takes a block parameter at a fixed index.
    BlockParam { index: usize },
    /// Cached under the current block number, but only stored when the
    /// result carries a non-zero `blockHash`.
    BlockHashInResponse,
}

impl MethodClass {
    /// Returns true if responses to this method may be cached.
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, MethodClass::NotHandled)
    }

    /// Index of the block parameter, if the method takes one.
    pub fn block_param_index(&self) -> Option<usize> {
        match self {
            MethodClass::BlockParam { index } => Some(*index),
            _ => None,
        }
    }
}

/// Methods that take a block parameter, with its position.
const BLOCK_PARAM_METHODS: &[(&str, usize)] = &[
    ("eth_call", 1),
    ("eth_getBalance", 1),
    ("eth_getBlockByNumber", 0),
    ("eth_getCode", 1),
    ("eth_getStorageAt", 2),
    ("eth_getTransactionCount", 1),
];

/// Methods whose responses are validated by their `blockHash`.
const BLOCK_HASH_METHODS: &[&str] = &["eth_getTransactionByHash", "eth_getTransactionReceipt"];

/// Methods cached under the current block without a block parameter.
const NO_BLOCK_PARAM_METHODS: &[&str] = &[
    "eth_blockNumber",
    "eth_estimateGas",
    "eth_gasPrice",
    "eth_getBlockByHash",
    "eth_getBlockTransactionCountByHash",
    "eth_getBlockTransactionCountByNumber",
    "eth_getFilterLogs",
    "eth_getTransactionByBlockHashAndIndex",
    "eth_getTransactionByBlockNumberAndIndex",
    "eth_getUncleByBlockHashAndIndex",
    "eth_getUncleByBlockNumberAndIndex",
    "eth_getUncleCountByBlockHash",
    "eth_getUncleCountByBlockNumber",
    "eth_protocolVersion",
    "web3_clientVersion",
];

/// Methods that are known and deliberately left alone.
///
/// Unknown methods are treated the same way; this list exists so the
/// registry can say which methods it has seen.
const NOT_HANDLED_METHODS: &[&str] = &[
    "eth_accounts",
    "eth_coinbase",
    "eth_feeHistory",
    "eth_getFilterChanges",
    "eth_getLogs",
    "eth_getWork",
    "eth_hashrate",
    "eth_mining",
    "eth_newBlockFilter",
    "eth_newFilter",
    "eth_newPendingTransactionFilter",
    "eth_sendRawTransaction",
    "eth_sendTransaction",
    "eth_sign",
    "eth_submitWork",
    "eth_subscribe",
    "eth_syncing",
    "eth_uninstallFilter",
    "eth_unsubscribe",
    "net_listening",
    "net_peerCount",
    "parity_nextNonce",
];

/// Look up the class of a method.
pub fn classify_method(method: &str) -> MethodClass {
    if let Some((_, index)) = BLOCK_PARAM_METHODS.iter().find(|(m, _)| *m == method) {
        return MethodClass::BlockParam { index: *index };
    }
    if BLOCK_HASH_METHODS.contains(&method) {
        return MethodClass::BlockHashInResponse;
    }
    if NO_BLOCK_PARAM_METHODS.contains(&method) {
        return MethodClass::NoBlockParam;
    }
    MethodClass::NotHandled
}

/// Returns true if the registry lists the method in any class.
pub fn is_known_method(method: &str) -> bool {
    NOT_HANDLED_METHODS.contains(&method) || classify_method(method) != MethodClass::NotHandled
}
