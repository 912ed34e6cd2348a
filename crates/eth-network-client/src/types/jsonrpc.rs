//! JSON-RPC 2.0 wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcError;

/// Literal result some nodes return in place of `null`.
const NIL_RESULT: &str = "<nil>";

/// A JSON-RPC request.
///
/// The `id` is for correlation only. It never takes part in cache keys or
/// request equality inside the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    /// Set once the block parameter has been filled in from the block
    /// tracker instead of coming from the caller. Never serialized.
    #[serde(skip)]
    pub(crate) block_resolved: bool,
}

impl JsonRpcRequest {
    /// Create a request with a null id.
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Value::Null,
            method: method.into(),
            params,
            block_resolved: false,
        }
    }

    /// Set the correlation id.
    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = id.into();
        self
    }
}

/// A JSON-RPC response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

fn default_version() -> String {
    "2.0".to_string()
}

impl JsonRpcResponse {
    /// Build a success response for the given id.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response for the given id.
    pub fn failure(id: Value, error: &RpcError) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: None,
            error: Some(JsonRpcErrorObject::from(error)),
        }
    }

    /// Collapse into the result, turning an `error` member into [`RpcError`].
    ///
    /// A response with neither member yields `Value::Null`, which callers
    /// treat as an empty result.
    pub fn into_result(self) -> Result<Value, RpcError> {
        if let Some(error) = self.error {
            return Err(error.into());
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// JSON-RPC error member.
///
/// Some upstreams put a bare string in `error`; that is accepted and kept
/// as the message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Code used when the upstream error member carries none.
const INTERNAL_ERROR_CODE: i64 = -32603;

impl<'de> Deserialize<'de> for JsonRpcErrorObject {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Object(map) => Self {
                code: map
                    .get("code")
                    .and_then(Value::as_i64)
                    .unwrap_or(INTERNAL_ERROR_CODE),
                message: map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                data: map.get("data").cloned(),
            },
            Value::String(message) => Self {
                code: INTERNAL_ERROR_CODE,
                message,
                data: None,
            },
            other => Self {
                code: INTERNAL_ERROR_CODE,
                message: other.to_string(),
                data: None,
            },
        })
    }
}

impl From<JsonRpcErrorObject> for RpcError {
    fn from(e: JsonRpcErrorObject) -> Self {
        RpcError::rpc(e.code, e.message, e.data)
    }
}

impl From<&RpcError> for JsonRpcErrorObject {
    fn from(e: &RpcError) -> Self {
        match e {
            RpcError::Rpc {
                code,
                message,
                data,
            } => Self {
                code: *code,
                message: message.clone(),
                data: data.clone(),
            },
            other => Self {
                code: INTERNAL_ERROR_CODE,
                message: other.to_string(),
                data: None,
            },
        }
    }
}

/// Returns true when a result carries no usable data.
///
/// `None` (member absent), JSON `null` and the string `"<nil>"` are empty.
pub fn is_empty_result(result: Option<&Value>) -> bool {
    match result {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s == NIL_RESULT,
        Some(_) => false,
    }
}
